//! Run validity tracking
//!
//! A run becomes invalid when something outside individual test verdicts
//! makes the result untrustworthy: a lost connection, an error in the log,
//! malformed traffic. Any component may invalidate from any thread; the
//! orchestrator reads the state at phase boundaries and at exit.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Snapshot of the run validity state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub invalid: bool,
    pub reasons: Vec<String>,
    pub total_tests_run: u64,
}

/// Shared handle to the run validity state
#[derive(Debug, Clone, Default)]
pub struct RunObserver {
    state: Arc<Mutex<RunState>>,
}

impl RunObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the run invalid. Repeated reasons are recorded once.
    pub fn invalidate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let added = {
            let mut state = self.state.lock();
            state.invalid = true;
            if state.reasons.contains(&reason) {
                false
            } else {
                state.reasons.push(reason.clone());
                true
            }
        };
        // Logged outside the lock: log layers may call back into the observer.
        if added {
            warn!("Test run has been marked as invalid. Reason: {}", reason);
        }
    }

    /// Mark the run invalid and log the underlying cause
    pub fn invalidate_with(&self, reason: impl Into<String>, cause: &dyn std::error::Error) {
        let reason = reason.into();
        warn!(error = %cause, "{}", reason);
        self.invalidate(reason);
    }

    pub fn is_invalid(&self) -> bool {
        self.state.lock().invalid
    }

    pub fn reasons(&self) -> Vec<String> {
        self.state.lock().reasons.clone()
    }

    pub fn set_total_tests_run(&self, total: u64) {
        self.state.lock().total_tests_run = total;
    }

    pub fn total_tests_run(&self) -> u64 {
        self.state.lock().total_tests_run
    }

    pub fn snapshot(&self) -> RunState {
        self.state.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_observer_is_valid() {
        let observer = RunObserver::new();
        assert!(!observer.is_invalid());
        assert!(observer.reasons().is_empty());
        assert_eq!(observer.total_tests_run(), 0);
    }

    #[test]
    fn test_invalidation_is_sticky_and_deduplicated() {
        let observer = RunObserver::new();
        observer.invalidate("first");
        observer.invalidate("second");
        observer.invalidate("first");

        assert!(observer.is_invalid());
        assert_eq!(observer.reasons(), vec!["first", "second"]);
    }

    #[test]
    fn test_clones_share_state() {
        let observer = RunObserver::new();
        let clone = observer.clone();
        clone.invalidate("from clone");
        clone.set_total_tests_run(7);

        let snapshot = observer.snapshot();
        assert!(snapshot.invalid);
        assert_eq!(snapshot.total_tests_run, 7);
    }

    #[test]
    fn test_invalidate_with_cause() {
        let observer = RunObserver::new();
        let cause = std::io::Error::new(std::io::ErrorKind::TimedOut, "no answer");
        observer.invalidate_with("Could not stop the test client", &cause);
        assert_eq!(observer.reasons(), vec!["Could not stop the test client"]);
    }

    #[test]
    fn test_concurrent_invalidation() {
        let observer = RunObserver::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let observer = observer.clone();
                std::thread::spawn(move || {
                    observer.invalidate(format!("reason {}", i % 4));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(observer.is_invalid());
        assert_eq!(observer.reasons().len(), 4);
    }
}
