//! In-memory plug manager and diagnoses manager for simulated stations.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use eyre::eyre;
use log::{debug, info};

use crate::domain::{Diagnosis, DiagnosisResult, PhaseOutcome, PlugType, TestDiagnoser, TestRecord};
use crate::station::{DiagnosesManager, PlugManager};

/// Lifecycle event seen by `SimPlugManager`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlugEvent {
    Initialized(PlugType),
    TornDown(PlugType),
}

#[derive(Default)]
struct PlugBench {
    initialized: BTreeSet<PlugType>,
    events: Vec<PlugEvent>,
}

/// Plug manager over a fixed set of named plugs
///
/// Plugs listed as failing return an error on initialization. Every
/// initialization and teardown is kept in an event log.
pub struct SimPlugManager {
    plugs: BTreeSet<PlugType>,
    failing: HashSet<PlugType>,
    bench: Mutex<PlugBench>,
}

impl SimPlugManager {
    pub fn new<I, P>(plugs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PlugType>,
    {
        Self {
            plugs: plugs.into_iter().map(Into::into).collect(),
            failing: HashSet::new(),
            bench: Mutex::new(PlugBench::default()),
        }
    }

    pub fn with_failing(mut self, plug: impl Into<PlugType>) -> Self {
        let plug = plug.into();
        self.plugs.insert(plug.clone());
        self.failing.insert(plug);
        self
    }

    pub fn events(&self) -> Vec<PlugEvent> {
        self.bench().events.clone()
    }

    pub fn initialized(&self) -> Vec<PlugType> {
        self.bench().initialized.iter().cloned().collect()
    }

    fn bench(&self) -> MutexGuard<'_, PlugBench> {
        self.bench.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PlugManager for SimPlugManager {
    async fn initialize_plugs(&self, plug_types: Option<&[PlugType]>) -> eyre::Result<()> {
        let requested: Vec<PlugType> = match plug_types {
            Some(types) => types.to_vec(),
            None => self.plugs.iter().cloned().collect(),
        };

        let mut bench = self.bench();
        for plug in requested {
            if bench.initialized.contains(&plug) {
                continue;
            }
            if self.failing.contains(&plug) {
                return Err(eyre!("plug {} failed to initialize", plug));
            }
            debug!("Initialized plug {}", plug);
            bench.initialized.insert(plug.clone());
            bench.events.push(PlugEvent::Initialized(plug));
        }
        Ok(())
    }

    async fn tear_down_plugs(&self) {
        let mut bench = self.bench();
        let plugs = std::mem::take(&mut bench.initialized);
        for plug in plugs {
            debug!("Tore down plug {}", plug);
            bench.events.push(PlugEvent::TornDown(plug));
        }
    }
}

/// Diagnoses manager that faults any record with a failed or errored phase
pub struct SimDiagnoses {
    failing: HashSet<String>,
}

impl SimDiagnoses {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
        }
    }

    /// Make the named diagnoser raise instead of diagnosing
    pub fn with_failing(mut self, diagnoser: impl Into<String>) -> Self {
        self.failing.insert(diagnoser.into());
        self
    }
}

impl Default for SimDiagnoses {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiagnosesManager for SimDiagnoses {
    async fn execute_test_diagnoser(
        &self,
        diagnoser: &TestDiagnoser,
        record: &mut TestRecord,
    ) -> eyre::Result<()> {
        if self.failing.contains(&diagnoser.name) {
            return Err(eyre!("diagnoser {} raised", diagnoser.name));
        }

        let bad = record
            .phases
            .iter()
            .filter(|p| matches!(p.outcome, PhaseOutcome::Fail | PhaseOutcome::Error))
            .count();
        let (result, description) = if bad == 0 {
            (DiagnosisResult::Pass, "all phases passed".to_string())
        } else {
            (DiagnosisResult::Fault, format!("{} phase(s) did not pass", bad))
        };
        info!("Diagnoser {} => {:?}", diagnoser.name, result);
        record.diagnoses.push(Diagnosis {
            diagnoser: diagnoser.name.clone(),
            result,
            description,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PhaseRecord;

    #[tokio::test]
    async fn test_partial_then_full_initialization() {
        let plugs = SimPlugManager::new(["dmm", "psu", "scope"]);

        plugs.initialize_plugs(Some(&["psu".to_string()])).await.unwrap();
        assert_eq!(plugs.initialized(), vec!["psu".to_string()]);

        plugs.initialize_plugs(None).await.unwrap();
        assert_eq!(plugs.initialized().len(), 3);
        let inits = plugs
            .events()
            .iter()
            .filter(|e| matches!(e, PlugEvent::Initialized(_)))
            .count();
        assert_eq!(inits, 3);

        plugs.tear_down_plugs().await;
        assert!(plugs.initialized().is_empty());
        assert!(plugs.events().contains(&PlugEvent::TornDown("scope".to_string())));
    }

    #[tokio::test]
    async fn test_failing_plug() {
        let plugs = SimPlugManager::new(["dmm"]).with_failing("relay");

        let err = plugs.initialize_plugs(None).await.unwrap_err();
        assert!(err.to_string().contains("relay"));
        assert_eq!(plugs.initialized(), vec!["dmm".to_string()]);
    }

    #[tokio::test]
    async fn test_diagnoser_verdicts() {
        let diagnoses = SimDiagnoses::new().with_failing("broken");
        let mut record = TestRecord::new("run-1", "t", "s");
        record.phases.push(PhaseRecord {
            name: "a".to_string(),
            outcome: PhaseOutcome::Fail,
            result: None,
            start_time_millis: 0,
            end_time_millis: 1,
        });

        diagnoses
            .execute_test_diagnoser(&TestDiagnoser::new("summary"), &mut record)
            .await
            .unwrap();
        assert_eq!(record.diagnoses[0].result, DiagnosisResult::Fault);

        let result = diagnoses
            .execute_test_diagnoser(&TestDiagnoser::new("broken"), &mut record)
            .await;
        assert!(result.is_err());
        assert_eq!(record.diagnoses.len(), 1);
    }
}
