//! Statistics the planner uses to cost plans. Today that is one structure:
//! the fixed-width integer histogram behind selectivity estimation.

pub mod histogram;

pub use histogram::{IntHistogram, PredicateOp};
