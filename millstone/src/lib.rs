//! # Millstone Storage Substrate
//! The storage layer of the Quern database.
//! This crate is responsible for the on-disk and in-memory representation of
//! data: heap files, the shared page cache, and page-level locking.

use std::sync::atomic::{AtomicUsize, Ordering};

/// The shared page cache and its transaction lifecycle operations.
pub mod buffer_pool;
/// The table registry consumed by the buffer pool.
pub mod catalog;
/// The storage error type.
pub mod error;
/// Heap files: unordered, page-structured tables on disk.
pub mod heap_file;
/// The lock manager for page-level concurrency control.
pub mod lock_manager;
/// The slotted page layout.
pub mod page;
/// Transaction identities.
pub mod transaction;
/// The tuple value model.
pub mod tuple;

/// The default size of a single page in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Bytes per page, process-wide.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::SeqCst)
}

/// Overrides the process-wide page size. FOR TESTING ONLY: changing the page
/// size while any buffer pool is live is undefined.
pub fn set_page_size(bytes: usize) {
    PAGE_SIZE.store(bytes, Ordering::SeqCst);
}

/// Restores the default page size. FOR TESTING ONLY.
pub fn reset_page_size() {
    PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::SeqCst);
}

/// A unique identifier for a heap file, derived from its canonical path.
pub type TableId = u64;

pub fn debug_logs_enabled() -> bool {
    std::env::var_os("MILLSTONE_DEBUG_LOG").is_some()
}

#[macro_export]
macro_rules! millstone_debug_log {
    ($($arg:tt)*) => {
        if $crate::debug_logs_enabled() {
            println!($($arg)*);
        }
    };
}

pub use buffer_pool::{BufferPool, PageRef};
pub use catalog::Catalog;
pub use error::{Result, StorageError};
pub use heap_file::{HeapFile, HeapScan};
pub use lock_manager::Perm;
pub use page::{HeapPage, HeapPageId};
pub use transaction::TransactionId;
pub use tuple::{Field, FieldType, RecordId, Tuple, TupleDesc};
