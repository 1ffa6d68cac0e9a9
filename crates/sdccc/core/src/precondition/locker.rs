//! Serialisation of device manipulations

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

/// Fair lock around manipulations
///
/// Observing preconditions may trigger manipulations at any time, so every
/// manipulation runs while holding this lock. Waiters are served in FIFO
/// order.
#[derive(Debug, Clone, Default)]
pub struct ManipulationLocker {
    lock: Arc<Mutex<()>>,
}

impl ManipulationLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` while holding the lock
    pub async fn lock<F, T>(&self, caller: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();
        let guard = self.lock.lock().await;
        debug!("Lock was granted for {}, executing", caller);
        let result = work.await;
        drop(guard);
        debug!("Releasing lock for {} after {:?}", caller, start.elapsed());
        result
    }

    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
