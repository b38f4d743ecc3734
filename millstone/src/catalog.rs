use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::heap_file::HeapFile;
use crate::TableId;

/// The registry of heap files the buffer pool serves pages for. Populated at
/// startup by the surrounding engine.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<HashMap<TableId, Arc<HeapFile>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a heap file under its own id, replacing any previous file
    /// with the same id. Returns the id.
    pub fn register(&self, file: Arc<HeapFile>) -> TableId {
        let id = file.id();
        self.tables.write().insert(id, file);
        id
    }

    pub fn file(&self, id: TableId) -> Option<Arc<HeapFile>> {
        self.tables.read().get(&id).cloned()
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.read().keys().copied().collect()
    }
}
