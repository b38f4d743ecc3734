use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, StorageError};
use crate::page::HeapPageId;

/// Content bytes reserved for a text field. Longer values are truncated on
/// encode.
pub const TEXT_MAX: usize = 128;

/// The type of a single tuple field. Every type has a fixed on-disk width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Text,
}

impl FieldType {
    /// On-disk width of a field of this type.
    pub fn byte_size(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Text => 4 + TEXT_MAX,
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Text(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Text(_) => FieldType::Text,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Int(_) => None,
            Field::Text(v) => Some(v),
        }
    }

    fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Field::Int(v) => buf.put_i32(*v),
            Field::Text(v) => {
                let bytes = v.as_bytes();
                let mut end = TEXT_MAX.min(bytes.len());
                while !v.is_char_boundary(end) {
                    end -= 1;
                }
                buf.put_u32(end as u32);
                buf.put_slice(&bytes[..end]);
                buf.put_bytes(0, TEXT_MAX - end);
            }
        }
    }

    fn read_from(ty: FieldType, buf: &mut impl Buf) -> Field {
        match ty {
            FieldType::Int => Field::Int(buf.get_i32()),
            FieldType::Text => {
                let len = (buf.get_u32() as usize).min(TEXT_MAX);
                let mut content = [0u8; TEXT_MAX];
                buf.copy_to_slice(&mut content);
                Field::Text(String::from_utf8_lossy(&content[..len]).into_owned())
            }
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{v}"),
            Field::Text(v) => write!(f, "{v}"),
        }
    }
}

/// An ordered list of field types: the schema of one tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleDesc {
    types: Vec<FieldType>,
}

impl TupleDesc {
    pub fn new(types: Vec<FieldType>) -> Self {
        TupleDesc { types }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn field_type(&self, index: usize) -> Option<FieldType> {
        self.types.get(index).copied()
    }

    pub fn types(&self) -> &[FieldType] {
        &self.types
    }

    /// On-disk width of one tuple with this schema.
    pub fn byte_size(&self) -> usize {
        self.types.iter().map(FieldType::byte_size).sum()
    }
}

/// Identifies a tuple's slot within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: HeapPageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: HeapPageId, slot: usize) -> Self {
        RecordId { page_id, slot }
    }
}

/// A row of field values plus, once placed on a page, its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    desc: TupleDesc,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Builds a tuple, validating arity and field types against the schema.
    pub fn new(desc: TupleDesc, fields: Vec<Field>) -> Result<Self> {
        if fields.len() != desc.len() {
            return Err(StorageError::Db(format!(
                "schema mismatch: {} fields for a {}-column schema",
                fields.len(),
                desc.len()
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            if Some(field.field_type()) != desc.field_type(i) {
                return Err(StorageError::Db(format!(
                    "schema mismatch at column {i}: {:?} vs {:?}",
                    field.field_type(),
                    desc.field_type(i)
                )));
            }
        }
        Ok(Tuple {
            desc,
            fields,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    pub(crate) fn write_to(&self, buf: &mut BytesMut) {
        for field in &self.fields {
            field.write_to(buf);
        }
    }

    pub(crate) fn read_from(desc: &TupleDesc, buf: &mut impl Buf) -> Tuple {
        let fields = desc
            .types()
            .iter()
            .map(|&ty| Field::read_from(ty, buf))
            .collect();
        Tuple {
            desc: desc.clone(),
            fields,
            record_id: None,
        }
    }
}
