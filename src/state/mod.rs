//! Test state module - the run status machine and its record.

mod test_state;

pub use test_state::{TestState, TestStatus};
