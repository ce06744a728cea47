//! Benchrun - a test-station execution engine
//!
//! Benchrun drives one hardware test run at a time: a start trigger, a tree of
//! setup/main/teardown phase groups, post-run diagnosers, and a final PASS,
//! FAIL, ERROR, TIMEOUT or ABORTED verdict. Aborts escalate from graceful to
//! forced and teardown phases are protected from graceful cancellation.

pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod id;
pub mod profile;
pub mod runner;
pub mod sim;
pub mod state;
pub mod station;

pub use error::{ExecutorError, Result};
pub use runner::{AbortHandle, TestExecutor};
pub use state::{TestState, TestStatus};
