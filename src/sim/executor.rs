//! Scripted phase executor
//!
//! Runs phases from per-name scripts instead of real phase bodies. Delays are
//! stop-aware: a stop request ends the running phase at once, which is how
//! simulated equipment reacts to a cancelled test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::{
    ExceptionInfo, PhaseDescriptor, PhaseExecutionOutcome, PhaseOutcome, PhaseRecord,
    PhaseResult, TestRecord,
};
use crate::id::now_ms;
use crate::profile::ProfileStats;
use crate::state::TestState;
use crate::station::{PhaseExecutor, PhaseExecutorFactory, PhaseRun};

/// Scripted behavior of one phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseScript {
    /// Classification returned by the phase; CONTINUE when unset
    pub result: Option<PhaseResult>,
    /// Overrides the terminality implied by `result`
    pub terminal: Option<bool>,
    /// Recorded phase outcome; derived from `result` when unset
    pub measurement: Option<PhaseOutcome>,
    /// How long the phase body runs
    pub delay_ms: u64,
    /// Error raised by the phase body
    pub raise: Option<String>,
    /// DUT id the phase sets on the record
    pub dut_id: Option<String>,
}

impl PhaseScript {
    pub fn result(result: PhaseResult) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    /// A failed measurement that lets the test continue
    pub fn failed_measurement() -> Self {
        Self {
            result: Some(PhaseResult::Continue),
            measurement: Some(PhaseOutcome::Fail),
            ..Self::default()
        }
    }

    pub fn raising(message: impl Into<String>) -> Self {
        Self {
            raise: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_terminal(mut self, terminal: bool) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn with_measurement(mut self, measurement: PhaseOutcome) -> Self {
        self.measurement = Some(measurement);
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_dut_id(mut self, dut_id: impl Into<String>) -> Self {
        self.dut_id = Some(dut_id.into());
        self
    }

    fn recorded_outcome(&self, result: PhaseResult) -> PhaseOutcome {
        self.measurement.unwrap_or(match result {
            PhaseResult::Continue | PhaseResult::Repeat | PhaseResult::Stop => PhaseOutcome::Pass,
            PhaseResult::Fail => PhaseOutcome::Fail,
            PhaseResult::Timeout | PhaseResult::Error => PhaseOutcome::Error,
        })
    }
}

enum PhaseEnd {
    Finished,
    Stopped,
    TimedOut,
}

/// Phase executor that plays back `PhaseScript`s
pub struct ScriptedPhaseExecutor {
    scripts: Arc<HashMap<String, PhaseScript>>,
    stop_tx: watch::Sender<bool>,
    running_tx: watch::Sender<bool>,
}

impl ScriptedPhaseExecutor {
    pub fn new(scripts: Arc<HashMap<String, PhaseScript>>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (running_tx, _) = watch::channel(false);
        Self {
            scripts,
            stop_tx,
            running_tx,
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    async fn run_body(&self, script: &PhaseScript, budget: Option<Duration>) -> PhaseEnd {
        if self.is_stop_requested() {
            return PhaseEnd::Stopped;
        }

        self.running_tx.send_replace(true);
        let stop_rx = self.stop_tx.subscribe();
        let end = tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(script.delay_ms)) => PhaseEnd::Finished,
            _ = stop_requested(stop_rx) => PhaseEnd::Stopped,
            _ = over_budget(budget) => PhaseEnd::TimedOut,
        };
        self.running_tx.send_replace(false);
        end
    }
}

async fn stop_requested(mut stop_rx: watch::Receiver<bool>) {
    // The sender lives as long as the executor, so this only ends on a stop.
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

async fn over_budget(budget: Option<Duration>) {
    match budget {
        Some(budget) => tokio::time::sleep(budget).await,
        None => std::future::pending::<()>().await,
    }
}

#[async_trait]
impl PhaseExecutor for ScriptedPhaseExecutor {
    async fn execute_phase(
        &self,
        phase: &PhaseDescriptor,
        record: &mut TestRecord,
        run_with_profiling: bool,
    ) -> PhaseRun {
        let script = self.scripts.get(&phase.name).cloned().unwrap_or_default();
        let budget = phase
            .timeout_s
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        let start_time_millis = now_ms();
        let started = Instant::now();

        let end = self.run_body(&script, budget).await;

        let (outcome, recorded, result) = match end {
            PhaseEnd::Stopped => {
                debug!("Phase {} was stopped", phase.name);
                let exception =
                    ExceptionInfo::new("PhaseTerminated", format!("phase {} was stopped", phase.name));
                (PhaseExecutionOutcome::from_exception(exception), PhaseOutcome::Error, None)
            }
            PhaseEnd::TimedOut => (
                PhaseExecutionOutcome::from_result(PhaseResult::Timeout),
                PhaseOutcome::Error,
                Some(PhaseResult::Timeout),
            ),
            PhaseEnd::Finished => match &script.raise {
                Some(message) => {
                    let exception = ExceptionInfo::new("PhaseError", message.clone());
                    (PhaseExecutionOutcome::from_exception(exception), PhaseOutcome::Error, None)
                }
                None => {
                    let result = script.result.unwrap_or(PhaseResult::Continue);
                    let outcome = match script.terminal {
                        Some(terminal) => PhaseExecutionOutcome::new(result, terminal),
                        None => PhaseExecutionOutcome::from_result(result),
                    };
                    (outcome, script.recorded_outcome(result), Some(result))
                }
            },
        };

        if let Some(dut_id) = &script.dut_id {
            record.dut_id = Some(dut_id.clone());
        }
        record.phases.push(PhaseRecord {
            name: phase.name.clone(),
            outcome: recorded,
            result,
            start_time_millis,
            end_time_millis: now_ms(),
        });

        let mut run = PhaseRun::new(outcome);
        if run_with_profiling {
            let mut profile = ProfileStats::new(phase.name.clone());
            profile.record(
                format!("{}::body", phase.name),
                1,
                started.elapsed().as_secs_f64() * 1000.0,
            );
            run = run.with_profile(profile);
        }
        run
    }

    async fn request_stop(&self, timeout: Duration) {
        self.stop_tx.send_replace(true);
        let mut running_rx = self.running_tx.subscribe();
        let stopped = tokio::time::timeout(timeout, running_rx.wait_for(|running| !*running))
            .await
            .is_ok();
        if !stopped {
            warn!("Running phase did not stop within {:?}", timeout);
        }
    }

    fn reset_stop(&self) {
        self.stop_tx.send_replace(false);
    }
}

/// Creates one scripted executor per run and keeps them for inspection
pub struct ScriptedExecutorFactory {
    scripts: Arc<HashMap<String, PhaseScript>>,
    created: Mutex<Vec<Arc<ScriptedPhaseExecutor>>>,
}

impl ScriptedExecutorFactory {
    pub fn new(scripts: HashMap<String, PhaseScript>) -> Self {
        Self {
            scripts: Arc::new(scripts),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Executor created for the most recent run
    pub fn last_executor(&self) -> Option<Arc<ScriptedPhaseExecutor>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl PhaseExecutorFactory for ScriptedExecutorFactory {
    fn create_executor(&self, state: &TestState) -> Arc<dyn PhaseExecutor> {
        debug!("[{}] Creating scripted phase executor", state.run_id());
        let executor = Arc::new(ScriptedPhaseExecutor::new(Arc::clone(&self.scripts)));
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&executor));
        executor
    }
}
