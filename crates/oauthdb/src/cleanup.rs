//! Cooperative expiry sweeps.
//!
//! Every context that opens a database schedules a sweep per partition, but
//! only one of them should do the work at a time. Each round first tries the
//! named lock `"<record-key>:cleanup"` without waiting; whoever gets it
//! sweeps, everyone else skips the round.
//!
//! Rounds recur: after each one the task sleeps for the configured interval
//! and tries again, so a context that lost the race takes over once the
//! holder is gone. The first round waits a startup delay (while holding the
//! lock) so the sweep does not race the store's initial load.
//!
//! Without a lock service the sweep runs unguarded. Several contexts may then
//! sweep the same record; the work is duplicated but idempotent.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CleanupConfig;
use crate::error::StoreError;
use crate::lock::LockManager;
use crate::partition::Partition;

/// Result of one cleanup round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The sweep ran and removed this many entries.
    Swept(usize),
    /// Another context holds the cleanup lock; nothing was done.
    LockUnavailable,
    /// The database was disposed before the sweep could run.
    Cancelled,
}

/// Schedules lock-guarded expiry sweeps.
#[derive(Debug, Clone)]
pub struct CleanupCoordinator {
    config: CleanupConfig,
    locks: Option<Arc<dyn LockManager>>,
}

impl CleanupCoordinator {
    /// Create a coordinator. `locks = None` means sweeps run unguarded.
    pub fn new(config: CleanupConfig, locks: Option<Arc<dyn LockManager>>) -> Self {
        if locks.is_none() {
            debug!("No lock service configured, cleanup sweeps run unguarded");
        }
        Self { config, locks }
    }

    /// Name of the cleanup lock for a record.
    pub fn lock_name(record_key: &str) -> String {
        format!("{}:cleanup", record_key)
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Run a single first round (startup delay included) right now.
    pub async fn run_once(&self, partition: &dyn Partition) -> CleanupOutcome {
        self.round(partition, self.config.startup_delay).await
    }

    /// Start the recurring sweep task for `partition`.
    ///
    /// Returns `None` when cleanup is disabled. The task exits when the
    /// partition's cancellation token fires.
    pub fn spawn(&self, partition: Arc<dyn Partition>) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            debug!(record_key = %partition.record_key(), "Cleanup disabled");
            return None;
        }
        let coordinator = self.clone();
        Some(tokio::spawn(async move { coordinator.run(partition).await }))
    }

    async fn run(self, partition: Arc<dyn Partition>) {
        let cancel = partition.cancellation().clone();
        let mut delay = self.config.startup_delay;

        loop {
            if self.round(partition.as_ref(), delay).await == CleanupOutcome::Cancelled {
                break;
            }
            delay = Duration::ZERO;

            if cancelled_during(self.config.interval, &cancel).await {
                break;
            }
        }

        debug!(record_key = %partition.record_key(), "Cleanup task stopped");
    }

    async fn round(&self, partition: &dyn Partition, delay: Duration) -> CleanupOutcome {
        let cancel = partition.cancellation();
        if cancel.is_cancelled() {
            return CleanupOutcome::Cancelled;
        }

        // Held until the end of the round.
        let _guard = match &self.locks {
            Some(locks) => {
                let name = Self::lock_name(partition.record_key());
                let acquired = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return CleanupOutcome::Cancelled,
                    guard = locks.try_acquire(&name) => guard,
                };
                match acquired {
                    Some(guard) => Some(guard),
                    None => {
                        debug!(lock = %name, "Cleanup lock held elsewhere, skipping sweep");
                        return CleanupOutcome::LockUnavailable;
                    }
                }
            }
            None => None,
        };

        if cancelled_during(delay, cancel).await || cancel.is_cancelled() {
            return CleanupOutcome::Cancelled;
        }

        match partition.sweep_expired().await {
            Ok(removed) => {
                if removed > 0 {
                    info!(record_key = %partition.record_key(), removed, "Swept expired entries");
                } else {
                    debug!(record_key = %partition.record_key(), "Sweep found nothing expired");
                }
                CleanupOutcome::Swept(removed)
            }
            Err(StoreError::Closed) => CleanupOutcome::Cancelled,
            Err(e) => {
                warn!(record_key = %partition.record_key(), error = %e, "Cleanup sweep failed");
                CleanupOutcome::Swept(0)
            }
        }
    }
}

/// Sleep for `delay`; returns true if cancelled first.
async fn cancelled_during(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::backend::MemoryBackend;
    use crate::lock::LocalLockManager;
    use crate::partition::PartitionStore;
    use crate::ttl::{ManualClock, fixed_ttl};

    struct Context {
        backend: MemoryBackend,
        store: PartitionStore<String>,
        cancel: CancellationToken,
    }

    fn context(backend: MemoryBackend, clock: &ManualClock) -> Context {
        let cancel = CancellationToken::new();
        let store = PartitionStore::new(
            "db",
            "items",
            Arc::new(backend.clone()),
            Arc::new(clock.clone()),
            fixed_ttl(Duration::from_millis(100)),
            cancel.clone(),
        );
        Context {
            backend,
            store,
            cancel,
        }
    }

    fn config() -> CleanupConfig {
        CleanupConfig::new()
            .with_startup_delay(Duration::from_secs(10))
            .with_interval(Duration::from_secs(60))
    }

    #[test]
    fn test_lock_name() {
        assert_eq!(
            CleanupCoordinator::lock_name("atcute-oauth:sessions"),
            "atcute-oauth:sessions:cleanup"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_sweeps_after_delay() {
        let clock = ManualClock::new(0);
        let ctx = context(MemoryBackend::new(), &clock);
        ctx.store.set("a", "alpha".to_string()).await.unwrap();
        clock.advance(Duration::from_secs(1));

        let coordinator = CleanupCoordinator::new(config(), Some(Arc::new(LocalLockManager::new())));
        let started = tokio::time::Instant::now();
        assert_eq!(coordinator.run_once(&ctx.store).await, CleanupOutcome::Swept(1));
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(ctx.store.keys().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_racing_contexts_sweep_once() {
        let clock = ManualClock::new(0);
        let a = context(MemoryBackend::new(), &clock);
        let b = context(a.backend.sibling(), &clock);
        a.store.set("x", "expiring".to_string()).await.unwrap();
        clock.advance(Duration::from_secs(1));

        let locks: Arc<dyn LockManager> = Arc::new(LocalLockManager::new());
        let coordinator = CleanupCoordinator::new(config(), Some(locks));
        let writes_before = b.backend.writes();

        let (first, second) = tokio::join!(
            coordinator.run_once(&a.store),
            coordinator.run_once(&b.store),
        );

        assert_eq!(first, CleanupOutcome::Swept(1));
        assert_eq!(second, CleanupOutcome::LockUnavailable);
        assert_eq!(b.backend.writes(), writes_before);
        assert_eq!(b.backend.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unguarded_without_lock_service() {
        let clock = ManualClock::new(0);
        let a = context(MemoryBackend::new(), &clock);
        let b = context(a.backend.sibling(), &clock);
        a.store.set("x", "expiring".to_string()).await.unwrap();
        clock.advance(Duration::from_secs(1));

        let coordinator = CleanupCoordinator::new(config(), None);
        let (first, second) = tokio::join!(
            coordinator.run_once(&a.store),
            coordinator.run_once(&b.store),
        );

        // Both sweep; the second finds the record already clean or removes
        // the same entry again, which is harmless.
        assert!(matches!(first, CleanupOutcome::Swept(_)));
        assert!(matches!(second, CleanupOutcome::Swept(_)));
        assert!(a.store.keys().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay() {
        let clock = ManualClock::new(0);
        let ctx = context(MemoryBackend::new(), &clock);
        let coordinator = CleanupCoordinator::new(config(), Some(Arc::new(LocalLockManager::new())));

        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        assert_eq!(coordinator.run_once(&ctx.store).await, CleanupOutcome::Cancelled);
        assert_eq!(ctx.backend.reads(), 0);
        assert_eq!(ctx.backend.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_task_sweeps_each_interval() {
        let clock = ManualClock::new(0);
        let ctx = context(MemoryBackend::new(), &clock);
        let coordinator = CleanupCoordinator::new(config(), Some(Arc::new(LocalLockManager::new())));
        let partition: Arc<dyn Partition> = Arc::new(ctx.store.clone());
        let handle = coordinator.spawn(partition).unwrap();

        ctx.store.set("a", "alpha".to_string()).await.unwrap();
        clock.advance(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(ctx.store.keys().await.unwrap().is_empty());

        ctx.store.set("b", "beta".to_string()).await.unwrap();
        clock.advance(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(ctx.store.keys().await.unwrap().is_empty());

        ctx.cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_spawns_nothing() {
        let clock = ManualClock::new(0);
        let ctx = context(MemoryBackend::new(), &clock);
        let coordinator = CleanupCoordinator::new(config().with_enabled(false), None);
        assert!(coordinator.spawn(Arc::new(ctx.store)).is_none());
    }
}
