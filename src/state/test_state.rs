//! TestState handles the lifetime of one test run.
//!
//! It owns the TestRecord and the run status. Every status in the finished
//! set is reached at most once: the first finalize wins and later attempts
//! fail with `AlreadyFinalized`.

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::domain::{PhaseExecutionOutcome, PhaseOutcome, PhaseResult, TestOptions, TestRecord};
use crate::error::{ExecutorError, Result};
use crate::id::now_ms;

/// Status of a test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Created,
    Waiting,
    Running,
    Pass,
    Fail,
    Error,
    Timeout,
    Aborted,
}

impl TestStatus {
    /// Returns true if the status is terminal
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TestStatus::Pass
                | TestStatus::Fail
                | TestStatus::Error
                | TestStatus::Timeout
                | TestStatus::Aborted
        )
    }

    /// Legacy coarse mapping from a raw phase classification.
    ///
    /// Only CONTINUE, REPEAT, FAIL and TIMEOUT have a coarse status; the
    /// richer STOP and ERROR results must go through `finalize_from_outcome`.
    pub fn from_phase_result(result: PhaseResult) -> Result<Self> {
        match result {
            PhaseResult::Continue | PhaseResult::Repeat => Ok(TestStatus::Waiting),
            PhaseResult::Fail => Ok(TestStatus::Fail),
            PhaseResult::Timeout => Ok(TestStatus::Timeout),
            PhaseResult::Stop | PhaseResult::Error => {
                Err(ExecutorError::InvalidPhaseResult(result.to_string()))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Created => "CREATED",
            TestStatus::Waiting => "WAITING",
            TestStatus::Running => "RUNNING",
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Error => "ERROR",
            TestStatus::Timeout => "TIMEOUT",
            TestStatus::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The evolving state of one test run
#[derive(Debug)]
pub struct TestState {
    record: TestRecord,
    status: TestStatus,
    options: TestOptions,
    closed: bool,
}

impl TestState {
    pub fn new(run_id: &str, options: TestOptions, station_id: &str) -> Self {
        let record = TestRecord::new(run_id, options.name.clone(), station_id);
        Self {
            record,
            status: TestStatus::Created,
            options,
            closed: false,
        }
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    pub fn record(&self) -> &TestRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut TestRecord {
        &mut self.record
    }

    pub fn options(&self) -> &TestOptions {
        &self.options
    }

    pub fn run_id(&self) -> &str {
        &self.record.run_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Record the test start; the start trigger (if any) has completed
    pub fn mark_started(&mut self) -> Result<()> {
        self.require(TestStatus::Created, "mark started")?;
        self.record.start_time_millis = Some(now_ms());
        self.status = TestStatus::Waiting;
        debug!("[{}] Test started", self.run_id());
        Ok(())
    }

    /// Mark the test as actually running (rather than waiting)
    pub fn set_running(&mut self) -> Result<()> {
        self.require(TestStatus::Waiting, "set running")?;
        self.status = TestStatus::Running;
        Ok(())
    }

    /// Apply the legacy coarse mapping for a raw phase result.
    ///
    /// Returns true if the test is now finished.
    pub fn apply_phase_result(&mut self, result: PhaseResult) -> Result<bool> {
        self.ensure_not_finished()?;
        let status = TestStatus::from_phase_result(result)?;
        if status.is_finished() {
            self.finalize(status)?;
        } else {
            self.status = status;
        }
        Ok(self.is_finished())
    }

    /// Finalize from the run's latched terminal outcome
    pub fn finalize_from_outcome(&mut self, outcome: &PhaseExecutionOutcome) -> Result<()> {
        self.ensure_not_finished()?;
        if !outcome.is_terminal() {
            return Err(ExecutorError::InvalidPhaseResult(format!(
                "{} outcome is not terminal",
                outcome.result()
            )));
        }

        if let Some(exception) = outcome.exception() {
            debug!(
                "[{}] Finishing test execution early due to exception, outcome ERROR",
                self.run_id()
            );
            self.record
                .add_outcome_details(exception.kind.clone(), exception.message.clone());
            return self.finalize(TestStatus::Error);
        }

        let status = match outcome.result() {
            // An ordered stop is a failing test
            PhaseResult::Stop => TestStatus::Fail,
            PhaseResult::Error => TestStatus::Error,
            other => TestStatus::from_phase_result(other)?,
        };
        if !status.is_finished() {
            return Err(ExecutorError::InvalidPhaseResult(format!(
                "terminal {} outcome has no finished status",
                outcome.result()
            )));
        }
        self.finalize(status)
    }

    /// Finalize a run that completed without a terminal outcome
    pub fn finalize_normally(&mut self) -> Result<()> {
        let status = if self.record.has_phase_outcome(PhaseOutcome::Error) {
            TestStatus::Error
        } else if self.record.has_phase_outcome(PhaseOutcome::Fail) {
            TestStatus::Fail
        } else {
            TestStatus::Pass
        };
        self.finalize(status)
    }

    /// Finalize as ERROR with one outcome detail
    pub fn finalize_as_error(
        &mut self,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<()> {
        self.ensure_not_finished()?;
        self.record.add_outcome_details(code, description);
        self.finalize(TestStatus::Error)
    }

    /// Finalize as ABORTED; repeated aborts are no-ops
    pub fn abort(&mut self) -> Result<()> {
        if self.status == TestStatus::Aborted {
            return Ok(());
        }
        self.finalize(TestStatus::Aborted)
    }

    /// Release run resources. The record stays readable.
    pub fn close(&mut self) {
        if !self.closed {
            debug!("[{}] Closing test state", self.run_id());
            self.closed = true;
        }
    }

    fn finalize(&mut self, status: TestStatus) -> Result<()> {
        self.ensure_not_finished()?;
        info!("[{}] Finishing test execution with status {}", self.run_id(), status);
        self.status = status;
        self.record.outcome = Some(status);
        self.record.end_time_millis = Some(now_ms());
        Ok(())
    }

    fn ensure_not_finished(&self) -> Result<()> {
        if self.status.is_finished() {
            return Err(ExecutorError::AlreadyFinalized(self.status));
        }
        Ok(())
    }

    fn require(&self, expected: TestStatus, action: &'static str) -> Result<()> {
        if self.status != expected {
            return Err(ExecutorError::InvalidTransition {
                from: self.status,
                action,
            });
        }
        Ok(())
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<TestState: {}, {}, {}>",
            self.record.station_id,
            self.record.dut_id.as_deref().unwrap_or("-"),
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExceptionInfo, PhaseRecord};

    fn new_state() -> TestState {
        TestState::new("run-1", TestOptions::default(), "station-1")
    }

    fn push_phase(state: &mut TestState, name: &str, outcome: PhaseOutcome) {
        state.record_mut().phases.push(PhaseRecord {
            name: name.to_string(),
            outcome,
            result: None,
            start_time_millis: 0,
            end_time_millis: 0,
        });
    }

    #[test]
    fn test_initial_state() {
        let state = new_state();
        assert_eq!(state.status(), TestStatus::Created);
        assert!(!state.is_finished());
        assert_eq!(state.record().run_id, "run-1");
        assert_eq!(state.record().station_id, "station-1");
        assert!(state.record().end_time_millis.is_none());
    }

    #[test]
    fn test_started_then_running() {
        let mut state = new_state();
        state.mark_started().unwrap();
        assert_eq!(state.status(), TestStatus::Waiting);
        assert!(state.record().start_time_millis.is_some());
        state.set_running().unwrap();
        assert_eq!(state.status(), TestStatus::Running);
    }

    #[test]
    fn test_set_running_requires_started() {
        let mut state = new_state();
        let err = state.set_running().unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::InvalidTransition { from: TestStatus::Created, .. }
        ));
    }

    #[test]
    fn test_legacy_mapping_table() {
        assert_eq!(TestStatus::from_phase_result(PhaseResult::Continue).unwrap(), TestStatus::Waiting);
        assert_eq!(TestStatus::from_phase_result(PhaseResult::Repeat).unwrap(), TestStatus::Waiting);
        assert_eq!(TestStatus::from_phase_result(PhaseResult::Fail).unwrap(), TestStatus::Fail);
        assert_eq!(TestStatus::from_phase_result(PhaseResult::Timeout).unwrap(), TestStatus::Timeout);
        assert!(matches!(
            TestStatus::from_phase_result(PhaseResult::Stop),
            Err(ExecutorError::InvalidPhaseResult(_))
        ));
    }

    #[test]
    fn test_apply_phase_result() {
        let mut state = new_state();
        assert!(!state.apply_phase_result(PhaseResult::Continue).unwrap());
        assert_eq!(state.status(), TestStatus::Waiting);
        assert!(state.apply_phase_result(PhaseResult::Timeout).unwrap());
        assert_eq!(state.status(), TestStatus::Timeout);
        assert!(matches!(
            state.apply_phase_result(PhaseResult::Continue),
            Err(ExecutorError::AlreadyFinalized(TestStatus::Timeout))
        ));
    }

    #[test]
    fn test_finalize_from_exception_records_details() {
        let mut state = new_state();
        let outcome = PhaseExecutionOutcome::from_exception(ExceptionInfo::new(
            "PlugInitializationError",
            "dmm not found",
        ));
        state.finalize_from_outcome(&outcome).unwrap();

        assert_eq!(state.status(), TestStatus::Error);
        assert_eq!(state.record().outcome, Some(TestStatus::Error));
        assert_eq!(state.record().outcome_details.len(), 1);
        assert_eq!(state.record().outcome_details[0].code, "PlugInitializationError");
        assert!(state.record().end_time_millis.is_some());
    }

    #[test]
    fn test_finalize_from_outcome_classifications() {
        let cases = [
            (PhaseResult::Stop, TestStatus::Fail),
            (PhaseResult::Fail, TestStatus::Fail),
            (PhaseResult::Timeout, TestStatus::Timeout),
            (PhaseResult::Error, TestStatus::Error),
        ];
        for (result, expected) in cases {
            let mut state = new_state();
            state
                .finalize_from_outcome(&PhaseExecutionOutcome::from_result(result))
                .unwrap();
            assert_eq!(state.status(), expected, "result {}", result);
        }
    }

    #[test]
    fn test_finalize_from_non_terminal_outcome_is_invalid() {
        let mut state = new_state();
        let err = state
            .finalize_from_outcome(&PhaseExecutionOutcome::from_result(PhaseResult::Continue))
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidPhaseResult(_)));

        let err = state
            .finalize_from_outcome(&PhaseExecutionOutcome::new(PhaseResult::Repeat, true))
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidPhaseResult(_)));
        assert!(!state.is_finished());
    }

    #[test]
    fn test_finalize_normally() {
        let mut state = new_state();
        push_phase(&mut state, "a", PhaseOutcome::Pass);
        state.finalize_normally().unwrap();
        assert_eq!(state.status(), TestStatus::Pass);

        let mut state = new_state();
        push_phase(&mut state, "a", PhaseOutcome::Pass);
        push_phase(&mut state, "b", PhaseOutcome::Fail);
        state.finalize_normally().unwrap();
        assert_eq!(state.status(), TestStatus::Fail);

        let mut state = new_state();
        push_phase(&mut state, "a", PhaseOutcome::Fail);
        push_phase(&mut state, "b", PhaseOutcome::Error);
        state.finalize_normally().unwrap();
        assert_eq!(state.status(), TestStatus::Error);
    }

    #[test]
    fn test_finalize_is_irreversible() {
        let mut state = new_state();
        state.finalize_normally().unwrap();
        let end = state.record().end_time_millis;

        assert!(matches!(
            state.abort(),
            Err(ExecutorError::AlreadyFinalized(TestStatus::Pass))
        ));
        assert!(matches!(
            state.finalize_normally(),
            Err(ExecutorError::AlreadyFinalized(_))
        ));
        assert_eq!(state.status(), TestStatus::Pass);
        assert_eq!(state.record().end_time_millis, end);
    }

    #[test]
    fn test_finalize_as_error_records_detail() {
        let mut state = new_state();
        state.mark_started().unwrap();
        state.set_running().unwrap();
        state.finalize_as_error("InvalidPhaseResult", "no status for CONTINUE").unwrap();

        assert_eq!(state.status(), TestStatus::Error);
        assert_eq!(state.record().outcome, Some(TestStatus::Error));
        assert!(state.record().end_time_millis.is_some());
        assert_eq!(state.record().outcome_details.len(), 1);
        assert_eq!(state.record().outcome_details[0].code, "InvalidPhaseResult");

        assert!(matches!(
            state.finalize_as_error("again", "ignored"),
            Err(ExecutorError::AlreadyFinalized(TestStatus::Error))
        ));
        assert_eq!(state.record().outcome_details.len(), 1);
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut state = new_state();
        state.abort().unwrap();
        state.abort().unwrap();
        assert_eq!(state.status(), TestStatus::Aborted);
    }

    #[test]
    fn test_close() {
        let mut state = new_state();
        assert!(!state.is_closed());
        state.close();
        state.close();
        assert!(state.is_closed());
    }

    #[test]
    fn test_display() {
        let mut state = new_state();
        state.record_mut().dut_id = Some("SN-7".to_string());
        assert_eq!(state.to_string(), "<TestState: station-1, SN-7, CREATED>");
    }
}
