//! Test descriptor and per-run options

use serde::{Deserialize, Serialize};

use crate::domain::group::PhaseGroup;

/// A post-run analysis step evaluated against the completed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDiagnoser {
    pub name: String,
}

impl TestDiagnoser {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Options for one run of a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestOptions {
    /// Test name used in the record
    pub name: String,
    /// DUT id substituted when nothing set one during the run
    pub default_dut_id: String,
    /// Diagnosers run in order after the phase tree
    pub diagnosers: Vec<TestDiagnoser>,
    /// Per-run override; stops on the first recorded FAIL
    pub stop_on_first_failure: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            name: "benchrun_test".to_string(),
            default_dut_id: "UNKNOWN_DUT_ID".to_string(),
            diagnosers: Vec::new(),
            stop_on_first_failure: false,
        }
    }
}

/// Immutable definition of a test: the root phase group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub phase_group: PhaseGroup,
}

impl TestDescriptor {
    pub fn new(phase_group: PhaseGroup) -> Self {
        Self { phase_group }
    }
}
