//! Station collaborators: the phase executor, plug manager and diagnoses
//! manager contracts consumed by the execution engine.

mod traits;

pub use traits::{
    Collaborators, DiagnosesManager, PhaseExecutor, PhaseExecutorFactory, PhaseRun, PlugManager,
};
