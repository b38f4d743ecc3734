use std::io;

use thiserror::Error;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying file read or write failure.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// Lock acquisition timed out. Fatal for the calling transaction; the
    /// caller is expected to unwind and abort it.
    #[error("transaction aborted: lock acquisition timed out")]
    TransactionAborted,

    /// Generic database-layer failure: schema mismatches, structural
    /// violations, a cache full of dirty pages.
    #[error("{0}")]
    Db(String),

    /// Iterator exhaustion, or `next` called on a closed iterator.
    #[error("no such element")]
    NoSuchElement,
}

pub type Result<T> = std::result::Result<T, StorageError>;
