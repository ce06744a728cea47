//! Test runner module - the execution engine.
//!
//! This module provides:
//! - TestExecutor, which drives one run end to end on a tokio task
//! - AbortHandle for escalating aborts from other tasks
//! - the recursive setup/main/teardown phase group runner

mod abort_handle;
mod executor;
mod phase_group;
mod test_run;

pub use abort_handle::AbortHandle;
pub use executor::TestExecutor;
