#![allow(dead_code)]

use std::sync::Arc;

use millstone::{BufferPool, Catalog, Field, FieldType, HeapFile, Tuple, TupleDesc};
use tempfile::TempDir;

/// A heap table on a temp directory, wired to its own catalog and pool.
/// Dropping it cleans the directory up.
pub struct TestTable {
    pub dir: TempDir,
    pub file: Arc<HeapFile>,
    pub pool: Arc<BufferPool>,
}

pub fn two_int_desc() -> TupleDesc {
    TupleDesc::new(vec![FieldType::Int, FieldType::Int])
}

pub fn text_int_desc() -> TupleDesc {
    TupleDesc::new(vec![FieldType::Text, FieldType::Int])
}

pub fn int_tuple(a: i32, b: i32) -> Tuple {
    Tuple::new(two_int_desc(), vec![Field::Int(a), Field::Int(b)]).unwrap()
}

pub fn text_int_tuple(group: &str, value: i32) -> Tuple {
    Tuple::new(
        text_int_desc(),
        vec![Field::Text(group.to_string()), Field::Int(value)],
    )
    .unwrap()
}

pub fn setup_table(name: &str, capacity: usize, desc: TupleDesc) -> TestTable {
    let dir = TempDir::new().unwrap();
    let file = Arc::new(HeapFile::open(dir.path().join(name), desc).unwrap());
    let catalog = Arc::new(Catalog::new());
    catalog.register(file.clone());
    let pool = Arc::new(BufferPool::new(capacity, catalog));
    TestTable { dir, file, pool }
}

/// A fresh catalog and pool over the same on-disk file, simulating a restart.
pub fn reopen(table: &TestTable, capacity: usize) -> (Arc<HeapFile>, Arc<BufferPool>) {
    let file = Arc::new(HeapFile::open(table.file.path(), table.file.desc().clone()).unwrap());
    let catalog = Arc::new(Catalog::new());
    catalog.register(file.clone());
    (file, Arc::new(BufferPool::new(capacity, catalog)))
}

/// Fills pages to the brim directly through the heap file, bypassing the
/// pool. Returns the number of tuples per page.
pub fn prefill_full_pages(table: &TestTable, pages: u32) -> usize {
    let desc = table.file.desc().clone();
    let mut per_page = 0;
    for page_no in 0..pages {
        let pid = millstone::HeapPageId::new(table.file.id(), page_no);
        let mut page = millstone::HeapPage::empty(pid, desc.clone());
        let mut i = 0;
        while page.num_empty_slots() > 0 {
            let mut t = int_tuple(i, page_no as i32);
            page.insert_tuple(&mut t).unwrap();
            i += 1;
        }
        per_page = i as usize;
        table.file.write_page(&page).unwrap();
    }
    per_page
}
