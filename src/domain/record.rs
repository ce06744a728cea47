//! Test record types
//!
//! The TestRecord is the single evolving artifact of a run: phase records are
//! appended by the phase executor, diagnoses by the diagnoses manager, and the
//! outcome and end timestamp are written exactly once at finalization.

use serde::{Deserialize, Serialize};

use crate::domain::phase::{PhaseOutcome, PhaseResult};
use crate::state::TestStatus;

/// Record of one executed phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub name: String,
    pub outcome: PhaseOutcome,
    /// Raw classification, if the phase body returned one
    pub result: Option<PhaseResult>,
    pub start_time_millis: u64,
    pub end_time_millis: u64,
}

/// Detail attached to a non-passing test outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeDetails {
    pub code: String,
    pub description: String,
}

/// Verdict of a diagnoser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosisResult {
    Pass,
    Warning,
    Fault,
}

/// Result produced by a test diagnoser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub diagnoser: String,
    pub result: DiagnosisResult,
    pub description: String,
}

/// Everything known about one test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub run_id: String,
    pub test_name: String,
    pub station_id: String,
    pub dut_id: Option<String>,
    pub start_time_millis: Option<u64>,
    pub end_time_millis: Option<u64>,
    pub outcome: Option<TestStatus>,
    pub outcome_details: Vec<OutcomeDetails>,
    pub phases: Vec<PhaseRecord>,
    pub diagnoses: Vec<Diagnosis>,
}

impl TestRecord {
    pub fn new(
        run_id: impl Into<String>,
        test_name: impl Into<String>,
        station_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            test_name: test_name.into(),
            station_id: station_id.into(),
            dut_id: None,
            start_time_millis: None,
            end_time_millis: None,
            outcome: None,
            outcome_details: Vec::new(),
            phases: Vec::new(),
            diagnoses: Vec::new(),
        }
    }

    /// DUT id if set and non-blank
    pub fn dut_id(&self) -> Option<&str> {
        self.dut_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn add_outcome_details(&mut self, code: impl Into<String>, description: impl Into<String>) {
        self.outcome_details.push(OutcomeDetails {
            code: code.into(),
            description: description.into(),
        });
    }

    /// Most recently recorded phase
    pub fn last_phase(&self) -> Option<&PhaseRecord> {
        self.phases.last()
    }

    pub fn has_phase_outcome(&self, outcome: PhaseOutcome) -> bool {
        self.phases.iter().any(|p| p.outcome == outcome)
    }

    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase_record(name: &str, outcome: PhaseOutcome) -> PhaseRecord {
        PhaseRecord {
            name: name.to_string(),
            outcome,
            result: None,
            start_time_millis: 0,
            end_time_millis: 1,
        }
    }

    #[test]
    fn test_blank_dut_id_is_unset() {
        let mut record = TestRecord::new("run-1", "t", "station");
        assert_eq!(record.dut_id(), None);
        record.dut_id = Some("   ".to_string());
        assert_eq!(record.dut_id(), None);
        record.dut_id = Some("SN-001".to_string());
        assert_eq!(record.dut_id(), Some("SN-001"));
    }

    #[test]
    fn test_phase_queries() {
        let mut record = TestRecord::new("run-1", "t", "station");
        assert!(record.last_phase().is_none());

        record.phases.push(phase_record("a", PhaseOutcome::Pass));
        record.phases.push(phase_record("b", PhaseOutcome::Fail));

        assert_eq!(record.last_phase().map(|p| p.name.as_str()), Some("b"));
        assert!(record.has_phase_outcome(PhaseOutcome::Fail));
        assert!(!record.has_phase_outcome(PhaseOutcome::Error));
        assert_eq!(record.phase_names(), vec!["a", "b"]);
    }
}
