//! Simulated station
//!
//! Scripted collaborators that let the engine run without hardware: the CLI
//! plays YAML plans through them and the tests use them to drive every path
//! of the executor.

mod executor;
mod plan;
mod plugs;

pub use executor::{PhaseScript, ScriptedExecutorFactory, ScriptedPhaseExecutor};
pub use plan::{SimStation, TestPlan};
pub use plugs::{PlugEvent, SimDiagnoses, SimPlugManager};
