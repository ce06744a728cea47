//! Error types for benchrun
//!
//! Centralized error handling using thiserror. Phase-level failures never show
//! up here: they become `PhaseExecutionOutcome` data. These variants cover the
//! engine's own faults and misuse of its API.

use thiserror::Error;

use crate::state::TestStatus;

/// All error types that can escape the execution engine
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Finalize was requested with no test state available
    #[error("Test stopped: no test state is available")]
    NotStarted,

    /// A phase result the state machine cannot map
    #[error("Invalid phase result: {0}")]
    InvalidPhaseResult(String),

    /// Finalization reached with no usable DUT identifier
    #[error("Blank or missing DUT ID; a non-blank ID is required")]
    BlankDutId,

    /// The test state already holds a terminal status
    #[error("Test already finalized with status {0}")]
    AlreadyFinalized(TestStatus),

    /// A state transition was requested from the wrong status
    #[error("Cannot {action} while test is {from}")]
    InvalidTransition { from: TestStatus, action: &'static str },

    /// The run body panicked; cleanup still ran
    #[error("Test execution panicked: {0}")]
    Panicked(String),

    /// The execution task could not be joined
    #[error("Execution task failed: {0}")]
    Join(String),

    /// Waiting for the execution task exceeded the wait bound
    #[error("Timed out waiting for test execution to finish")]
    WaitTimedOut,

    /// `start` was called on an executor that already ran
    #[error("Test executor already started")]
    AlreadyStarted,

    /// A test plan or phase tree failed validation
    #[error("Invalid test plan: {0}")]
    InvalidPlan(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for benchrun operations
pub type Result<T> = std::result::Result<T, ExecutorError>;
