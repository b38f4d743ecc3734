use bytes::BytesMut;

use crate::error::{Result, StorageError};
use crate::transaction::TransactionId;
use crate::tuple::{RecordId, Tuple, TupleDesc};
use crate::{page_size, TableId};

/// A unique identifier for a page of a heap file.
/// Page 0 is the first page of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapPageId {
    pub table_id: TableId,
    pub page_no: u32,
}

impl HeapPageId {
    pub fn new(table_id: TableId, page_no: u32) -> Self {
        HeapPageId { table_id, page_no }
    }
}

impl std::fmt::Display for HeapPageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// A slotted page: a slot-occupancy bitmap followed by fixed-width tuple
/// slots. The number of slots is chosen so that bitmap plus slots fit the
/// process-wide page size.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: HeapPageId,
    desc: TupleDesc,
    page_size: usize,
    slots: Vec<Option<Tuple>>,
    dirty: Option<TransactionId>,
}

fn slot_capacity(page_size: usize, tuple_bytes: usize) -> usize {
    (page_size * 8) / (tuple_bytes * 8 + 1)
}

fn header_bytes(slot_count: usize) -> usize {
    (slot_count + 7) / 8
}

impl HeapPage {
    /// A fresh page with every slot empty.
    pub fn empty(pid: HeapPageId, desc: TupleDesc) -> Self {
        let page_size = page_size();
        let slot_count = slot_capacity(page_size, desc.byte_size());
        HeapPage {
            pid,
            desc,
            page_size,
            slots: vec![None; slot_count],
            dirty: None,
        }
    }

    /// Decodes a page from its on-disk image. The image must be exactly one
    /// page long.
    pub fn from_bytes(pid: HeapPageId, desc: TupleDesc, data: &[u8]) -> Result<Self> {
        let page_size = page_size();
        if data.len() != page_size {
            return Err(StorageError::Db(format!(
                "page image for {pid} is {} bytes, expected {page_size}",
                data.len()
            )));
        }

        let tuple_bytes = desc.byte_size();
        let slot_count = slot_capacity(page_size, tuple_bytes);
        let header = header_bytes(slot_count);

        let mut slots = Vec::with_capacity(slot_count);
        for slot in 0..slot_count {
            let used = data[slot / 8] >> (slot % 8) & 1 == 1;
            if used {
                let offset = header + slot * tuple_bytes;
                let mut tuple = Tuple::read_from(&desc, &mut &data[offset..offset + tuple_bytes]);
                tuple.set_record_id(Some(RecordId::new(pid, slot)));
                slots.push(Some(tuple));
            } else {
                slots.push(None);
            }
        }

        Ok(HeapPage {
            pid,
            desc,
            page_size,
            slots,
            dirty: None,
        })
    }

    pub fn id(&self) -> HeapPageId {
        self.pid
    }

    pub fn desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// The transaction that dirtied this page, if any.
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirty
    }

    pub fn mark_dirty(&mut self, owner: Option<TransactionId>) {
        self.dirty = owner;
    }

    /// Places the tuple in the first empty slot and assigns its RecordId.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<()> {
        if *tuple.desc() != self.desc {
            return Err(StorageError::Db(format!(
                "schema mismatch inserting into page {}",
                self.pid
            )));
        }
        let slot = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| StorageError::Db(format!("page {} is full", self.pid)))?;
        tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
        self.slots[slot] = Some(tuple.clone());
        Ok(())
    }

    /// Clears the slot named by the tuple's RecordId.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| StorageError::Db("tuple has no record id".to_string()))?;
        if rid.page_id != self.pid {
            return Err(StorageError::Db(format!(
                "tuple belongs to page {}, not {}",
                rid.page_id, self.pid
            )));
        }
        match self.slots.get_mut(rid.slot) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(StorageError::Db(format!(
                "slot {} of page {} is already empty",
                rid.slot, self.pid
            ))),
        }
    }

    /// The occupied tuples, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// The serialized page image, exactly one page long.
    pub fn page_data(&self) -> Vec<u8> {
        let tuple_bytes = self.desc.byte_size();
        let header = header_bytes(self.slots.len());

        let mut buf = BytesMut::with_capacity(self.page_size);
        let mut bitmap = vec![0u8; header];
        for (slot, tuple) in self.slots.iter().enumerate() {
            if tuple.is_some() {
                bitmap[slot / 8] |= 1 << (slot % 8);
            }
        }
        buf.extend_from_slice(&bitmap);

        for tuple in &self.slots {
            match tuple {
                Some(t) => t.write_to(&mut buf),
                None => buf.extend_from_slice(&vec![0u8; tuple_bytes]),
            }
        }
        buf.resize(self.page_size, 0);
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{Field, FieldType};

    fn int_desc() -> TupleDesc {
        TupleDesc::new(vec![FieldType::Int, FieldType::Int])
    }

    fn int_tuple(a: i32, b: i32) -> Tuple {
        Tuple::new(int_desc(), vec![Field::Int(a), Field::Int(b)]).unwrap()
    }

    #[test]
    fn slot_capacity_matches_bitmap_layout() {
        // 8-byte tuples at the default 4096-byte page: 32768 / 65 slots.
        let page = HeapPage::empty(HeapPageId::new(1, 0), int_desc());
        assert_eq!(page.slot_count(), (4096 * 8) / (8 * 8 + 1));
        assert_eq!(page.num_empty_slots(), page.slot_count());
    }

    #[test]
    fn insert_assigns_record_ids_and_round_trips() {
        let pid = HeapPageId::new(7, 3);
        let mut page = HeapPage::empty(pid, int_desc());

        let mut first = int_tuple(1, 10);
        let mut second = int_tuple(2, 20);
        page.insert_tuple(&mut first).unwrap();
        page.insert_tuple(&mut second).unwrap();
        assert_eq!(first.record_id(), Some(RecordId::new(pid, 0)));
        assert_eq!(second.record_id(), Some(RecordId::new(pid, 1)));

        let image = page.page_data();
        assert_eq!(image.len(), crate::page_size());

        let decoded = HeapPage::from_bytes(pid, int_desc(), &image).unwrap();
        let tuples: Vec<_> = decoded.iter().cloned().collect();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].field(1), Some(&Field::Int(10)));
        assert_eq!(tuples[1].record_id(), Some(RecordId::new(pid, 1)));
    }

    #[test]
    fn delete_frees_the_slot_and_rejects_strays() {
        let pid = HeapPageId::new(7, 0);
        let mut page = HeapPage::empty(pid, int_desc());

        let mut t = int_tuple(1, 2);
        page.insert_tuple(&mut t).unwrap();
        let free = page.num_empty_slots();

        page.delete_tuple(&t).unwrap();
        assert_eq!(page.num_empty_slots(), free + 1);
        assert!(page.delete_tuple(&t).is_err());

        let unplaced = int_tuple(3, 4);
        assert!(page.delete_tuple(&unplaced).is_err());
    }

    #[test]
    fn page_fills_up_to_its_slot_count() {
        let pid = HeapPageId::new(9, 0);
        let mut page = HeapPage::empty(pid, int_desc());
        for i in 0..page.slot_count() as i32 {
            let mut t = int_tuple(i, i);
            page.insert_tuple(&mut t).unwrap();
        }
        assert_eq!(page.num_empty_slots(), 0);
        let mut overflow = int_tuple(-1, -1);
        assert!(page.insert_tuple(&mut overflow).is_err());
    }

    #[test]
    fn dirty_tag_tracks_owner() {
        let mut page = HeapPage::empty(HeapPageId::new(1, 0), int_desc());
        assert_eq!(page.is_dirty(), None);
        let tid = TransactionId::new();
        page.mark_dirty(Some(tid));
        assert_eq!(page.is_dirty(), Some(tid));
        page.mark_dirty(None);
        assert_eq!(page.is_dirty(), None);
    }
}
