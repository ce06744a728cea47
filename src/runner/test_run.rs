//! One test run, start to finish, on the execution task.
//!
//! `run_test` is the body of the execution task:
//! 1. Create the TestState and publish the phase executor
//! 2. Run the start trigger with only its own plugs initialized
//! 3. Initialize the remaining plugs
//! 4. Run the root phase group, then the diagnosers
//! 5. Always tear down plugs and finalize the state, even after an error
//!    or a panic in steps 1-4

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, error, warn};

use crate::config::ExecutorConfig;
use crate::domain::{
    ExceptionInfo, PhaseDescriptor, PhaseExecutionOutcome, PlugType, TestDescriptor,
    TestDiagnoser, TestOptions,
};
use crate::error::{ExecutorError, Result};
use crate::profile::ProfileStats;
use crate::runner::abort_handle::RunShared;
use crate::state::TestState;
use crate::station::{Collaborators, PhaseExecutor, PhaseRun};

/// Everything the execution task needs to start a run
pub(crate) struct RunSetup {
    pub(crate) descriptor: Arc<TestDescriptor>,
    pub(crate) test_start: Option<PhaseDescriptor>,
    pub(crate) options: TestOptions,
    pub(crate) config: ExecutorConfig,
    pub(crate) station_id: String,
    pub(crate) run_with_profiling: bool,
    pub(crate) collaborators: Collaborators,
    pub(crate) shared: Arc<RunShared>,
}

/// What the execution task hands back when it ends
pub(crate) struct RunOutput {
    pub(crate) state: TestState,
    pub(crate) phase_profile_stats: Vec<ProfileStats>,
    pub(crate) error: Option<ExecutorError>,
}

/// Mutable bookkeeping of a run in progress
pub(crate) struct TestRun {
    pub(super) descriptor: Arc<TestDescriptor>,
    pub(super) test_start: Option<PhaseDescriptor>,
    pub(super) config: ExecutorConfig,
    pub(super) run_with_profiling: bool,
    pub(super) collaborators: Collaborators,
    pub(super) shared: Arc<RunShared>,
    pub(super) state: TestState,
    pub(super) phase_exec: Arc<dyn PhaseExecutor>,
    /// First terminal outcome of the run; never replaced once set
    pub(super) last_outcome: Option<PhaseExecutionOutcome>,
    pub(super) phase_profile_stats: Vec<ProfileStats>,
    /// Nesting depth of teardown stages; only the outermost holds the lock
    pub(super) teardown_depth: usize,
}

pub(crate) async fn run_test(setup: RunSetup) -> RunOutput {
    let state = TestState::new(&setup.shared.run_id, setup.options.clone(), &setup.station_id);
    let phase_exec = setup.collaborators.executors.create_executor(&state);
    setup.shared.publish_executor(Arc::clone(&phase_exec));

    let mut run = TestRun {
        descriptor: setup.descriptor,
        test_start: setup.test_start,
        config: setup.config,
        run_with_profiling: setup.run_with_profiling,
        collaborators: setup.collaborators,
        shared: setup.shared,
        state,
        phase_exec,
        last_outcome: None,
        phase_profile_stats: Vec::new(),
        teardown_depth: 0,
    };

    let body = AssertUnwindSafe(run.execute()).catch_unwind().await;
    let mut failure = match body {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            error!("[{}] Error in test executor: {}", run.run_id(), e);
            Some(e)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("[{}] Test executor panicked: {}", run.run_id(), message);
            Some(ExecutorError::Panicked(message))
        }
    };

    if let Err(e) = run.execute_test_teardown().await {
        error!("[{}] Failed to finalize test state: {}", run.run_id(), e);
        failure.get_or_insert(e);
    }

    RunOutput {
        state: run.state,
        phase_profile_stats: run.phase_profile_stats,
        error: failure,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl TestRun {
    pub(super) fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    pub(super) fn has_terminal_outcome(&self) -> bool {
        self.last_outcome.as_ref().is_some_and(|o| o.is_terminal())
    }

    async fn execute(&mut self) -> Result<()> {
        if let Some(test_start) = self.test_start.clone() {
            if self.execute_test_start(&test_start).await {
                // Exit early if the start trigger ended in a terminal outcome of any kind.
                return Ok(());
            }
        }
        self.state.mark_started()?;

        // Full plug initialization happens after the start trigger, as close to
        // the phases as possible, so equipment starts the run in a known state.
        if self.initialize_plugs(None).await {
            return Ok(());
        }

        self.state.set_running()?;
        let descriptor = Arc::clone(&self.descriptor);
        self.execute_phase_group(&descriptor.phase_group).await;
        self.execute_test_diagnosers().await;
        Ok(())
    }

    /// Returns true if plug initialization failed; the failure is latched
    async fn initialize_plugs(&mut self, plug_types: Option<&[PlugType]>) -> bool {
        match self.collaborators.plugs.initialize_plugs(plug_types).await {
            Ok(()) => false,
            Err(report) => {
                error!("[{}] Plug initialization failed: {:#}", self.run_id(), report);
                self.last_outcome = Some(PhaseExecutionOutcome::from_exception(
                    ExceptionInfo::from_report("PlugInitializationError", &report),
                ));
                true
            }
        }
    }

    /// Run the start trigger phase. Returns true on a terminal outcome.
    async fn execute_test_start(&mut self, test_start: &PhaseDescriptor) -> bool {
        if self.initialize_plugs(Some(&test_start.plugs)).await {
            return true;
        }

        let PhaseRun { outcome, profile } = self
            .phase_exec
            .execute_phase(test_start, self.state.record_mut(), self.run_with_profiling)
            .await;
        if let Some(profile) = profile {
            self.phase_profile_stats.push(profile);
        }

        if outcome.is_terminal() {
            self.last_outcome = Some(outcome);
            return true;
        }

        if self.state.record().dut_id().is_none() {
            warn!("[{}] Start trigger did not set a DUT ID", self.run_id());
        }
        false
    }

    async fn execute_test_diagnosers(&mut self) {
        let diagnosers = self.state.options().diagnosers.clone();
        for diagnoser in &diagnosers {
            self.execute_test_diagnoser(diagnoser).await;
        }
    }

    async fn execute_test_diagnoser(&mut self, diagnoser: &TestDiagnoser) {
        let result = self
            .collaborators
            .diagnoses
            .execute_test_diagnoser(diagnoser, self.state.record_mut())
            .await;
        let Err(report) = result else {
            return;
        };

        if self.has_terminal_outcome() {
            error!(
                "[{}] Test diagnoser {} failed, but the test outcome is already terminal: {:#}",
                self.run_id(),
                diagnoser.name,
                report
            );
        } else {
            self.last_outcome = Some(PhaseExecutionOutcome::from_exception(
                ExceptionInfo::from_report("DiagnoserError", &report),
            ));
        }
    }

    /// Tear down plugs, then finalize the state exactly once
    async fn execute_test_teardown(&mut self) -> Result<()> {
        // Plug teardown does not affect the test outcome.
        self.collaborators.plugs.tear_down_plugs().await;

        if self.shared.abort.is_set() {
            debug!("[{}] Finishing test with outcome ABORTED", self.run_id());
            return self.state.abort();
        }
        let Some(outcome) = self.last_outcome.as_ref().filter(|o| o.is_terminal()) else {
            return self.state.finalize_normally();
        };

        match self.state.finalize_from_outcome(outcome) {
            // The state must still end finished, so an unmappable outcome is an ERROR.
            Err(ExecutorError::InvalidPhaseResult(reason)) => {
                self.state.finalize_as_error("InvalidPhaseResult", reason.clone())?;
                Err(ExecutorError::InvalidPhaseResult(reason))
            }
            other => other,
        }
    }
}
