//! Phase execution outcome types.
//!
//! An outcome is the data form of whatever happened inside a phase: a plain
//! classification, or an error captured at the phase boundary.

use serde::{Deserialize, Serialize};

use crate::domain::phase::PhaseResult;

/// An error captured at a phase, plug or diagnoser boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Short error code, e.g. "PlugInitializationError"
    pub kind: String,
    /// Human-readable description including the cause chain
    pub message: String,
}

impl ExceptionInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Capture an eyre report, keeping its whole cause chain in the message
    pub fn from_report(kind: impl Into<String>, report: &eyre::Report) -> Self {
        Self::new(kind, format!("{:#}", report))
    }
}

/// Result of executing one phase. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseExecutionOutcome {
    is_terminal: bool,
    result: PhaseResult,
    exception: Option<ExceptionInfo>,
}

impl PhaseExecutionOutcome {
    /// Outcome with explicit terminality (e.g. a non-terminal FAIL that
    /// lets the remaining phases run)
    pub fn new(result: PhaseResult, is_terminal: bool) -> Self {
        Self {
            is_terminal,
            result,
            exception: None,
        }
    }

    /// Outcome whose terminality follows the classification
    pub fn from_result(result: PhaseResult) -> Self {
        Self::new(result, result.is_terminal_by_default())
    }

    /// A captured error; always terminal, classified ERROR
    pub fn from_exception(exception: ExceptionInfo) -> Self {
        Self {
            is_terminal: true,
            result: PhaseResult::Error,
            exception: Some(exception),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    pub fn result(&self) -> PhaseResult {
        self.result
    }

    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception.as_ref()
    }

    pub fn raised_exception(&self) -> bool {
        self.exception.is_some()
    }

    pub fn is_timeout(&self) -> bool {
        self.result == PhaseResult::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_result_terminality() {
        assert!(!PhaseExecutionOutcome::from_result(PhaseResult::Continue).is_terminal());
        assert!(PhaseExecutionOutcome::from_result(PhaseResult::Stop).is_terminal());
        assert!(PhaseExecutionOutcome::from_result(PhaseResult::Timeout).is_timeout());
    }

    #[test]
    fn test_non_terminal_fail() {
        let outcome = PhaseExecutionOutcome::new(PhaseResult::Fail, false);
        assert!(!outcome.is_terminal());
        assert_eq!(outcome.result(), PhaseResult::Fail);
        assert!(!outcome.raised_exception());
    }

    #[test]
    fn test_exception_outcome() {
        let report = eyre::eyre!("bus fault").wrap_err("dmm failed to open");
        let info = ExceptionInfo::from_report("PlugInitializationError", &report);
        assert_eq!(info.kind, "PlugInitializationError");
        assert!(info.message.contains("dmm failed to open"));
        assert!(info.message.contains("bus fault"));

        let outcome = PhaseExecutionOutcome::from_exception(info.clone());
        assert!(outcome.is_terminal());
        assert_eq!(outcome.result(), PhaseResult::Error);
        assert_eq!(outcome.exception(), Some(&info));
    }
}
