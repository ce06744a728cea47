//! Leaf phase types
//!
//! A phase is the smallest schedulable unit of test logic. The engine never
//! looks inside a phase body; it only hands the descriptor to a `PhaseExecutor`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

/// Name of a plug type a phase depends on (e.g. "power_supply")
pub type PlugType = String;

/// Raw classification returned by a phase body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhaseResult {
    /// Proceed to the next phase
    Continue,
    /// Run the same phase again
    Repeat,
    /// The phase failed
    Fail,
    /// The phase exceeded its time budget
    Timeout,
    /// Stop the test now
    Stop,
    /// The phase body errored
    Error,
}

impl PhaseResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseResult::Continue => "CONTINUE",
            PhaseResult::Repeat => "REPEAT",
            PhaseResult::Fail => "FAIL",
            PhaseResult::Timeout => "TIMEOUT",
            PhaseResult::Stop => "STOP",
            PhaseResult::Error => "ERROR",
        }
    }

    /// Whether this classification ends the run when no explicit
    /// terminality is supplied
    pub fn is_terminal_by_default(&self) -> bool {
        !matches!(self, PhaseResult::Continue | PhaseResult::Repeat)
    }
}

impl fmt::Display for PhaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseResult {
    type Err = ExecutorError;

    /// Collaborators outside the crate may hand over arbitrary names; anything
    /// unknown is rejected here instead of reaching the state machine.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONTINUE" => Ok(PhaseResult::Continue),
            "REPEAT" => Ok(PhaseResult::Repeat),
            "FAIL" => Ok(PhaseResult::Fail),
            "TIMEOUT" => Ok(PhaseResult::Timeout),
            "STOP" => Ok(PhaseResult::Stop),
            "ERROR" => Ok(PhaseResult::Error),
            _ => Err(ExecutorError::InvalidPhaseResult(s.to_string())),
        }
    }
}

/// Outcome recorded for a phase in the test record (measurement level)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhaseOutcome {
    Pass,
    Fail,
    Skip,
    Error,
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseOutcome::Pass => "PASS",
            PhaseOutcome::Fail => "FAIL",
            PhaseOutcome::Skip => "SKIP",
            PhaseOutcome::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Immutable description of one leaf phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDescriptor {
    /// Phase name, unique enough to be read in logs and records
    pub name: String,
    /// Plug types this phase needs initialized before it runs
    #[serde(default)]
    pub plugs: Vec<PlugType>,
    /// Per-phase time budget enforced by the phase executor
    #[serde(default)]
    pub timeout_s: Option<f64>,
}

impl PhaseDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugs: Vec::new(),
            timeout_s: None,
        }
    }

    /// Declare a plug this phase uses
    pub fn with_plug(mut self, plug: impl Into<PlugType>) -> Self {
        self.plugs.push(plug.into());
        self
    }

    pub fn with_timeout_s(mut self, timeout_s: f64) -> Self {
        self.timeout_s = Some(timeout_s);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_result_parse_known() {
        assert_eq!("continue".parse::<PhaseResult>().unwrap(), PhaseResult::Continue);
        assert_eq!(" STOP ".parse::<PhaseResult>().unwrap(), PhaseResult::Stop);
        assert_eq!("Timeout".parse::<PhaseResult>().unwrap(), PhaseResult::Timeout);
    }

    #[test]
    fn test_phase_result_parse_unknown_is_invalid() {
        let err = "SKIP".parse::<PhaseResult>().unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidPhaseResult(ref s) if s == "SKIP"));
    }

    #[test]
    fn test_default_terminality() {
        assert!(!PhaseResult::Continue.is_terminal_by_default());
        assert!(!PhaseResult::Repeat.is_terminal_by_default());
        assert!(PhaseResult::Fail.is_terminal_by_default());
        assert!(PhaseResult::Timeout.is_terminal_by_default());
        assert!(PhaseResult::Stop.is_terminal_by_default());
        assert!(PhaseResult::Error.is_terminal_by_default());
    }

    #[test]
    fn test_phase_result_serde_uppercase() {
        let json = serde_json::to_string(&PhaseResult::Stop).unwrap();
        assert_eq!(json, "\"STOP\"");
        assert!(serde_json::from_str::<PhaseResult>("\"BOGUS\"").is_err());
    }

    #[test]
    fn test_descriptor_builder() {
        let phase = PhaseDescriptor::new("measure_voltage")
            .with_plug("dmm")
            .with_plug("power_supply")
            .with_timeout_s(5.0);
        assert_eq!(phase.name, "measure_voltage");
        assert_eq!(phase.plugs, vec!["dmm".to_string(), "power_supply".to_string()]);
        assert_eq!(phase.timeout_s, Some(5.0));
    }
}
