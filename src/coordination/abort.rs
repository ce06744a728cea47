//! Abort signalling between the execution task and outside callers
//!
//! The abort state only moves forward: None, then Graceful, then Forced.
//! The execution task polls it at every stage-entry boundary; any task may
//! escalate it.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Tri-state abort level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum AbortState {
    /// No abort requested
    None = 0,
    /// Stop the current phase with a bounded wait; teardown still runs
    Graceful = 1,
    /// Stop immediately and skip remaining teardown
    Forced = 2,
}

impl AbortState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AbortState::None,
            1 => AbortState::Graceful,
            _ => AbortState::Forced,
        }
    }

    fn next(self) -> Self {
        match self {
            AbortState::None => AbortState::Graceful,
            AbortState::Graceful | AbortState::Forced => AbortState::Forced,
        }
    }
}

impl fmt::Display for AbortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortState::None => "none",
            AbortState::Graceful => "graceful",
            AbortState::Forced => "forced",
        };
        f.write_str(s)
    }
}

/// Result of one escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Escalation {
    pub previous: AbortState,
    pub current: AbortState,
}

/// Shared, monotonic abort flag
#[derive(Debug, Default)]
pub struct AbortSignal {
    state: AtomicU8,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AbortState {
        AbortState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True once any abort has been requested
    pub fn is_set(&self) -> bool {
        self.state() >= AbortState::Graceful
    }

    pub fn is_forced(&self) -> bool {
        self.state() == AbortState::Forced
    }

    /// Move one level up; Forced stays Forced
    pub fn escalate(&self) -> Escalation {
        let previous = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                Some(AbortState::from_u8(raw).next() as u8)
            })
            .map(AbortState::from_u8)
            .unwrap_or(AbortState::Forced);
        Escalation {
            previous,
            current: previous.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_initial_state() {
        let signal = AbortSignal::new();
        assert_eq!(signal.state(), AbortState::None);
        assert!(!signal.is_set());
        assert!(!signal.is_forced());
    }

    #[test]
    fn test_escalation_is_monotonic() {
        let signal = AbortSignal::new();

        let first = signal.escalate();
        assert_eq!(first.previous, AbortState::None);
        assert_eq!(first.current, AbortState::Graceful);
        assert!(signal.is_set());
        assert!(!signal.is_forced());

        let second = signal.escalate();
        assert_eq!(second.previous, AbortState::Graceful);
        assert_eq!(second.current, AbortState::Forced);
        assert!(signal.is_forced());

        let third = signal.escalate();
        assert_eq!(third.previous, AbortState::Forced);
        assert_eq!(third.current, AbortState::Forced);
        assert_eq!(signal.state(), AbortState::Forced);
    }

    #[test]
    fn test_concurrent_escalations_reach_forced_once() {
        let signal = Arc::new(AbortSignal::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                std::thread::spawn(move || signal.escalate())
            })
            .collect();
        let escalations: Vec<Escalation> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let graceful = escalations
            .iter()
            .filter(|e| e.current == AbortState::Graceful)
            .count();
        let first_forced = escalations
            .iter()
            .filter(|e| e.previous == AbortState::Graceful)
            .count();
        assert_eq!(graceful, 1);
        assert_eq!(first_forced, 1);
        assert!(signal.is_forced());
    }

    #[test]
    fn test_ordering_and_display() {
        assert!(AbortState::None < AbortState::Graceful);
        assert!(AbortState::Graceful < AbortState::Forced);
        assert_eq!(AbortState::Forced.to_string(), "forced");
    }
}
