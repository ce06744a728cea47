//! TestExecutor drives a single test run on its own tokio task.
//!
//! Lifecycle for the owner:
//! `start` -> (`abort` from anywhere) -> `wait` -> `finalize` -> `close`.
//! `close` must always be called when done with an executor.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::config::{ExecutorConfig, StationConfig};
use crate::coordination::AbortState;
use crate::domain::{PhaseDescriptor, TestDescriptor, TestOptions};
use crate::error::{ExecutorError, Result};
use crate::profile::ProfileStats;
use crate::runner::abort_handle::{AbortHandle, RunShared};
use crate::runner::test_run::{RunOutput, RunSetup, run_test};
use crate::state::TestState;
use crate::station::Collaborators;

/// Bound on `wait`. Large enough to never fire in practice while keeping the
/// wait a timed one.
const WAIT_TIMEOUT: Duration = Duration::from_secs(31_557_600);

/// Encompasses the execution of a single test
pub struct TestExecutor {
    descriptor: Arc<TestDescriptor>,
    test_start: Option<PhaseDescriptor>,
    options: TestOptions,
    config: ExecutorConfig,
    station_id: String,
    run_with_profiling: bool,
    collaborators: Collaborators,
    shared: Arc<RunShared>,
    handle: Option<JoinHandle<RunOutput>>,
    started: bool,
    test_state: Option<TestState>,
    phase_profile_stats: Vec<ProfileStats>,
}

impl TestExecutor {
    /// Create a new executor. Nothing runs until `start`.
    pub fn new(
        descriptor: impl Into<Arc<TestDescriptor>>,
        execution_uid: impl Into<String>,
        test_start: Option<PhaseDescriptor>,
        options: TestOptions,
        config: ExecutorConfig,
        collaborators: Collaborators,
    ) -> Self {
        let shared = Arc::new(RunShared::new(execution_uid.into(), config.cancel_timeout()));
        Self {
            descriptor: descriptor.into(),
            test_start,
            options,
            config,
            station_id: StationConfig::default().station_id,
            run_with_profiling: false,
            collaborators,
            shared,
            handle: None,
            started: false,
            test_state: None,
            phase_profile_stats: Vec::new(),
        }
    }

    /// Collect a profile per phase
    pub fn with_profiling(mut self, run_with_profiling: bool) -> Self {
        self.run_with_profiling = run_with_profiling;
        self
    }

    pub fn with_station_id(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = station_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    /// Handle that can abort this run from any task
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(Arc::clone(&self.shared))
    }

    pub fn abort_state(&self) -> AbortState {
        self.shared.abort.state()
    }

    /// Whether the execution task has been spawned and has not ended
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the execution task. Must be called within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(ExecutorError::AlreadyStarted);
        }
        self.started = true;

        let setup = RunSetup {
            descriptor: Arc::clone(&self.descriptor),
            test_start: self.test_start.clone(),
            options: self.options.clone(),
            config: self.config.clone(),
            station_id: self.station_id.clone(),
            run_with_profiling: self.run_with_profiling,
            collaborators: self.collaborators.clone(),
            shared: Arc::clone(&self.shared),
        };
        self.handle = Some(tokio::spawn(run_test(setup)));
        Ok(())
    }

    /// Abort this test; see `AbortHandle::abort`
    pub async fn abort(&self) {
        self.abort_handle().abort().await;
    }

    /// Wait for the execution task to end.
    ///
    /// Returns the run's internal error, if any, after cleanup has run. The
    /// test state is available to `finalize` either way.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        let joined = tokio::time::timeout(WAIT_TIMEOUT, handle)
            .await
            .map_err(|_| ExecutorError::WaitTimedOut)?;
        self.handle = None;

        let output = joined.map_err(|e| ExecutorError::Join(e.to_string()))?;
        self.test_state = Some(output.state);
        self.phase_profile_stats = output.phase_profile_stats;
        match output.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait for the run to end and release its test state
    pub async fn close(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("[{}] Waiting for test execution to finish", self.run_id());
        }
        let result = self.wait().await;
        if let Some(mut state) = self.test_state.take() {
            state.close();
        }
        result
    }

    /// Return the finished test state for output.
    ///
    /// Fails with `NotStarted` before the run has ended or after `close`, and
    /// refuses a state that never reached a terminal status. A missing DUT id
    /// is replaced by the configured default with a warning.
    pub fn finalize(&mut self) -> Result<&TestState> {
        let state = self.test_state.as_mut().ok_or(ExecutorError::NotStarted)?;
        if !state.is_finished() {
            return Err(ExecutorError::InvalidTransition {
                from: state.status(),
                action: "finalize",
            });
        }
        if state.record().dut_id().is_none() {
            if self.options.default_dut_id.trim().is_empty() {
                return Err(ExecutorError::BlankDutId);
            }
            warn!("[{}] DUT ID is still not set; using default", state.run_id());
            state.record_mut().dut_id = Some(self.options.default_dut_id.clone());
        }
        Ok(state)
    }

    /// Finished test state, if the run has ended and was not closed
    pub fn test_state(&self) -> Option<&TestState> {
        self.test_state.as_ref()
    }

    /// Per-phase profiles in execution order
    pub fn phase_profile_stats(&self) -> &[ProfileStats] {
        &self.phase_profile_stats
    }
}

impl std::fmt::Debug for TestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestExecutor")
            .field("run_id", &self.shared.run_id)
            .field("started", &self.started)
            .field("abort_state", &self.abort_state())
            .finish()
    }
}
