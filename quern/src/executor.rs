use millstone::{Tuple, TupleDesc};

use crate::errors::ExecutionError;

/// The pull-based iterator contract every operator implements.
///
/// An iterator starts closed: `has_next` reports false and `next` fails with
/// `NoSuchElement` until `open` has been called. `rewind` is equivalent to
/// `close` followed by `open`.
pub trait OpIterator {
    fn open(&mut self) -> Result<(), ExecutionError>;

    fn has_next(&mut self) -> Result<bool, ExecutionError>;

    fn next(&mut self) -> Result<Tuple, ExecutionError>;

    fn rewind(&mut self) -> Result<(), ExecutionError>;

    /// The schema of the tuples this iterator yields.
    fn tuple_desc(&self) -> TupleDesc;

    fn close(&mut self);
}
