//! State shared between the execution task and abort callers.
//!
//! Two locks guard the abort protocol:
//! - `phase_exec` holds the run's phase executor once it is published, so an
//!   abort can reach it from any task.
//! - `teardown_lock` is held while teardown phases run. A graceful abort only
//!   stops the executor if it can take this lock without waiting; a forced
//!   abort ignores it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::debug;

use crate::coordination::{AbortSignal, AbortState, Escalation};
use crate::station::PhaseExecutor;

pub(crate) struct RunShared {
    pub(crate) run_id: String,
    pub(crate) abort: AbortSignal,
    pub(crate) teardown_lock: Arc<tokio::sync::Mutex<()>>,
    phase_exec: Mutex<Option<Arc<dyn PhaseExecutor>>>,
    cancel_timeout: Duration,
}

impl RunShared {
    pub(crate) fn new(run_id: String, cancel_timeout: Duration) -> Self {
        Self {
            run_id,
            abort: AbortSignal::new(),
            teardown_lock: Arc::new(tokio::sync::Mutex::new(())),
            phase_exec: Mutex::new(None),
            cancel_timeout,
        }
    }

    /// Make the run's executor visible to abort callers
    pub(crate) fn publish_executor(&self, executor: Arc<dyn PhaseExecutor>) {
        *self.phase_exec.lock().unwrap_or_else(PoisonError::into_inner) = Some(executor);
    }

    fn current_executor(&self) -> Option<Arc<dyn PhaseExecutor>> {
        self.phase_exec
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn stop_phase_executor(&self, force: bool) {
        let Some(phase_exec) = self.current_executor() else {
            debug!("[{}] Test has not started executing; nothing to stop", self.run_id);
            return;
        };

        if force {
            // No wait and no reset: remaining teardown is skipped anyway.
            phase_exec.request_stop(Duration::ZERO).await;
            return;
        }

        let Ok(_teardown) = self.teardown_lock.try_lock() else {
            debug!("[{}] Teardown phases are running; not cancelling them", self.run_id);
            return;
        };
        phase_exec.request_stop(self.cancel_timeout).await;
        // Reset so the executor can still run teardown phases, unless a
        // forced abort landed while we waited.
        if !self.abort.is_forced() {
            phase_exec.reset_stop();
        }
    }
}

/// Cloneable handle for aborting a run from any task
#[derive(Clone)]
pub struct AbortHandle {
    shared: Arc<RunShared>,
}

impl AbortHandle {
    pub(crate) fn new(shared: Arc<RunShared>) -> Self {
        Self { shared }
    }

    pub fn run_id(&self) -> &str {
        &self.shared.run_id
    }

    pub fn state(&self) -> AbortState {
        self.shared.abort.state()
    }

    /// Abort the run, escalating on each call.
    ///
    /// The first call marks the run aborted and stops the running phase,
    /// waiting at most the cancel timeout; queued teardown phases still run.
    /// A second call stops the executor immediately, bypassing the teardown
    /// lock, and remaining teardown phases are skipped.
    pub async fn abort(&self) {
        let escalation = self.shared.abort.escalate();
        self.act(escalation).await;
    }

    /// Escalate now and stop the executor on a spawned task.
    ///
    /// The abort state has moved on when this returns, so a caller can
    /// escalate again without waiting out the graceful cancel timeout.
    pub fn spawn_abort(&self) -> tokio::task::JoinHandle<()> {
        let escalation = self.shared.abort.escalate();
        let handle = self.clone();
        tokio::spawn(async move { handle.act(escalation).await })
    }

    async fn act(&self, escalation: Escalation) {
        match escalation.previous {
            AbortState::None => {
                tracing::error!(
                    run_id = %self.shared.run_id,
                    state = %escalation.current,
                    "Abort test executor"
                );
                self.shared.stop_phase_executor(false).await;
            }
            AbortState::Graceful => {
                tracing::error!(
                    run_id = %self.shared.run_id,
                    state = %escalation.current,
                    "Abort already set; forcibly stopping the test"
                );
                self.shared.stop_phase_executor(true).await;
            }
            AbortState::Forced => {
                tracing::warn!(run_id = %self.shared.run_id, "Test is already forcibly aborted");
            }
        }
    }
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("run_id", &self.shared.run_id)
            .field("state", &self.state())
            .finish()
    }
}
