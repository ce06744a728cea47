//! YAML test plans for the simulated station
//!
//! A plan holds a phase tree, the per-run options, and a script per phase:
//!
//! ```yaml
//! name: smoke
//! start:
//!   name: scan_dut
//!   plugs: [scanner]
//! group:
//!   setup:
//!     - phase: {name: power_on, plugs: [psu]}
//!   main:
//!     - phase: {name: measure_rail}
//!   teardown:
//!     - phase: {name: power_off, plugs: [psu]}
//! scripts:
//!   scan_dut: {dut_id: SN-0042}
//!   measure_rail: {result: FAIL}
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::domain::{PhaseDescriptor, PhaseGroup, PlugType, TestDescriptor, TestDiagnoser, TestOptions};
use crate::error::{ExecutorError, Result};
use crate::sim::executor::{PhaseScript, ScriptedExecutorFactory};
use crate::sim::plugs::{SimDiagnoses, SimPlugManager};
use crate::station::Collaborators;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPlan {
    pub name: String,
    pub default_dut_id: String,
    pub stop_on_first_failure: bool,
    /// Start trigger, run before full plug initialization
    pub start: Option<PhaseDescriptor>,
    pub group: PhaseGroup,
    pub scripts: HashMap<String, PhaseScript>,
    pub diagnosers: Vec<String>,
    pub failing_diagnosers: Vec<String>,
    pub failing_plugs: Vec<PlugType>,
}

impl Default for TestPlan {
    fn default() -> Self {
        let options = TestOptions::default();
        Self {
            name: options.name,
            default_dut_id: options.default_dut_id,
            stop_on_first_failure: options.stop_on_first_failure,
            start: None,
            group: PhaseGroup::default(),
            scripts: HashMap::new(),
            diagnosers: Vec::new(),
            failing_diagnosers: Vec::new(),
            failing_plugs: Vec::new(),
        }
    }
}

impl TestPlan {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let plan = Self::from_yaml(&content)?;
        info!("Loaded test plan {} from {}", plan.name, path.as_ref().display());
        Ok(plan)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let plan: Self = serde_yaml::from_str(content)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Reject malformed plans; unknown script names only warn
    pub fn validate(&self) -> Result<()> {
        self.group.validate()?;
        if let Some(start) = &self.start {
            if start.name.trim().is_empty() {
                return Err(ExecutorError::InvalidPlan("start phase has a blank name".to_string()));
            }
        }

        let known: BTreeSet<&str> = self
            .group
            .iter_phases()
            .chain(self.start.iter())
            .map(|p| p.name.as_str())
            .collect();
        for name in self.scripts.keys() {
            if !known.contains(name.as_str()) {
                warn!("Script for unknown phase {} in plan {}", name, self.name);
            }
        }
        Ok(())
    }

    pub fn descriptor(&self) -> TestDescriptor {
        TestDescriptor::new(self.group.clone())
    }

    pub fn options(&self) -> TestOptions {
        TestOptions {
            name: self.name.clone(),
            default_dut_id: self.default_dut_id.clone(),
            diagnosers: self.diagnosers.iter().map(TestDiagnoser::new).collect(),
            stop_on_first_failure: self.stop_on_first_failure,
        }
    }

    /// Every plug any phase of the plan uses, sorted
    pub fn plug_types(&self) -> Vec<PlugType> {
        self.group
            .iter_phases()
            .chain(self.start.iter())
            .flat_map(|p| p.plugs.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Build the simulated station that plays this plan
    pub fn station(&self) -> SimStation {
        let plugs = self
            .failing_plugs
            .iter()
            .fold(SimPlugManager::new(self.plug_types()), |plugs, p| plugs.with_failing(p.clone()));
        let diagnoses = self
            .failing_diagnosers
            .iter()
            .fold(SimDiagnoses::new(), |d, name| d.with_failing(name.clone()));

        SimStation {
            executors: Arc::new(ScriptedExecutorFactory::new(self.scripts.clone())),
            plugs: Arc::new(plugs),
            diagnoses: Arc::new(diagnoses),
        }
    }
}

/// Concrete simulated collaborators, kept typed for inspection
#[derive(Clone)]
pub struct SimStation {
    pub executors: Arc<ScriptedExecutorFactory>,
    pub plugs: Arc<SimPlugManager>,
    pub diagnoses: Arc<SimDiagnoses>,
}

impl SimStation {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.executors.clone(),
            self.plugs.clone(),
            self.diagnoses.clone(),
        )
    }
}
