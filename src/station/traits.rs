//! Collaborator interfaces the execution engine drives
//!
//! The engine never runs phase bodies, talks to hardware, or analyses records
//! itself. It calls these traits and turns whatever comes back into outcome data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{PhaseDescriptor, PhaseExecutionOutcome, PlugType, TestDiagnoser, TestRecord};
use crate::profile::ProfileStats;
use crate::state::TestState;

/// What a phase executor returns for one phase
#[derive(Debug, Clone)]
pub struct PhaseRun {
    pub outcome: PhaseExecutionOutcome,
    /// Present only when profiling was requested
    pub profile: Option<ProfileStats>,
}

impl PhaseRun {
    pub fn new(outcome: PhaseExecutionOutcome) -> Self {
        Self {
            outcome,
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: ProfileStats) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Runs one phase body with its own timeout and cancellation
///
/// `execute_phase` must capture anything the phase body raises into the
/// returned outcome and append the phase's record to `record`.
/// `request_stop` may be called from another task while a phase is running.
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    async fn execute_phase(
        &self,
        phase: &PhaseDescriptor,
        record: &mut TestRecord,
        run_with_profiling: bool,
    ) -> PhaseRun;

    /// Cancel the running phase and wait up to `timeout` for it to exit.
    /// Phases started after this call end immediately until `reset_stop`.
    async fn request_stop(&self, timeout: Duration);

    /// Clear a previous stop request so later phases run normally
    fn reset_stop(&self);
}

/// Creates the phase executor for a run, once its state exists
pub trait PhaseExecutorFactory: Send + Sync {
    fn create_executor(&self, state: &TestState) -> Arc<dyn PhaseExecutor>;
}

/// Hardware-abstraction plug lifecycle
#[async_trait]
pub trait PlugManager: Send + Sync {
    /// Initialize plugs; `None` initializes every plug not yet initialized
    async fn initialize_plugs(&self, plug_types: Option<&[PlugType]>) -> eyre::Result<()>;

    /// Best-effort teardown of every initialized plug. Never fails.
    async fn tear_down_plugs(&self);
}

/// Post-run diagnosis
#[async_trait]
pub trait DiagnosesManager: Send + Sync {
    async fn execute_test_diagnoser(
        &self,
        diagnoser: &TestDiagnoser,
        record: &mut TestRecord,
    ) -> eyre::Result<()>;
}

/// The set of collaborators a test executor needs
#[derive(Clone)]
pub struct Collaborators {
    pub executors: Arc<dyn PhaseExecutorFactory>,
    pub plugs: Arc<dyn PlugManager>,
    pub diagnoses: Arc<dyn DiagnosesManager>,
}

impl Collaborators {
    pub fn new(
        executors: Arc<dyn PhaseExecutorFactory>,
        plugs: Arc<dyn PlugManager>,
        diagnoses: Arc<dyn DiagnosesManager>,
    ) -> Self {
        Self {
            executors,
            plugs,
            diagnoses,
        }
    }
}
