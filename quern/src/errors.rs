use millstone::StorageError;
use thiserror::Error;

/// Errors surfaced by the execution layer.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A failure bubbling up from the storage substrate.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A misuse of an operator, such as aggregating a text field as an
    /// integer or asking a string aggregator for anything but a count.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `next` called on a closed or exhausted iterator.
    #[error("no such element")]
    NoSuchElement,
}
