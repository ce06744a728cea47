//! Domain types for benchrun
//!
//! This module contains the data model the engine runs over:
//! - PhaseDescriptor / PhaseResult: leaf phases and their raw classifications
//! - PhaseGroup / PhaseNode: the recursive setup/main/teardown tree
//! - PhaseExecutionOutcome: result of executing one phase
//! - TestRecord: the evolving record of a run
//! - TestDescriptor / TestOptions: what to run and how

pub mod descriptor;
pub mod group;
pub mod outcome;
pub mod phase;
pub mod record;

pub use descriptor::{TestDescriptor, TestDiagnoser, TestOptions};
pub use group::{PhaseGroup, PhaseNode, Stage};
pub use outcome::{ExceptionInfo, PhaseExecutionOutcome};
pub use phase::{PhaseDescriptor, PhaseOutcome, PhaseResult, PlugType};
pub use record::{Diagnosis, DiagnosisResult, OutcomeDetails, PhaseRecord, TestRecord};
