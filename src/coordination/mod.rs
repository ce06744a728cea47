//! Run coordination module
//!
//! Implements the escalating abort signal shared between the execution task
//! and whoever asks the run to stop.

pub mod abort;

pub use abort::*;
