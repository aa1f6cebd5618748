//! Cross-context cache invalidation.
//!
//! When another execution context writes a partition's record, the cached
//! copy here is stale. The listener drops it (no merging) so the next
//! operation reloads from the backend.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{StorageBackend, StorageChange};
use crate::partition::Partition;

/// Handle to a running change listener.
#[derive(Debug)]
pub struct ChangeListener {
    record_key: String,
    handle: Option<JoinHandle<()>>,
}

impl ChangeListener {
    /// Subscribe to `backend` on behalf of `partition`.
    ///
    /// The subscription is taken before this returns, so writes made after
    /// construction are never missed. Without a notification channel the
    /// listener is inert. It stops when the partition's cancellation token
    /// fires.
    pub fn start(partition: Arc<dyn Partition>, backend: &dyn StorageBackend) -> Self {
        let record_key = partition.record_key().to_string();
        let handle = match backend.watch() {
            Some(changes) => Some(tokio::spawn(listen(partition, changes))),
            None => {
                debug!(record_key = %record_key, "Backend has no change notifications, listener inactive");
                None
            }
        };
        Self { record_key, handle }
    }

    /// Record key this listener reacts to.
    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    /// Whether the listener task is still running.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

async fn listen(partition: Arc<dyn Partition>, mut changes: broadcast::Receiver<StorageChange>) {
    let cancel = partition.cancellation().clone();
    loop {
        let change = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            change = changes.recv() => change,
        };

        match change {
            Ok(change) if change.key == partition.record_key() => {
                debug!(record_key = %change.key, "Foreign write observed");
                partition.invalidate().await;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                // Our record may be among the missed notifications.
                warn!(record_key = %partition.record_key(), skipped, "Change notifications dropped, invalidating");
                partition.invalidate().await;
            }
            Err(RecvError::Closed) => {
                debug!(record_key = %partition.record_key(), "Change channel closed");
                break;
            }
        }
    }
    debug!(record_key = %partition.record_key(), "Change listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::backend::{FileBackend, MemoryBackend};
    use crate::partition::PartitionStore;
    use crate::ttl::{ManualClock, never_expires};

    fn store(backend: &MemoryBackend, cancel: &CancellationToken) -> PartitionStore<String> {
        PartitionStore::new(
            "db",
            "items",
            Arc::new(backend.clone()),
            Arc::new(ManualClock::new(0)),
            never_expires(),
            cancel.clone(),
        )
    }

    async fn wait_until_unloaded(store: &PartitionStore<String>) -> bool {
        for _ in 0..100 {
            if !store.is_loaded().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_foreign_write_invalidates() {
        let backend = MemoryBackend::new();
        let cancel = CancellationToken::new();
        let store = store(&backend, &cancel);
        let listener = ChangeListener::start(Arc::new(store.clone()), &backend);
        assert!(listener.is_active());
        assert_eq!(listener.record_key(), "db:items");

        store.set("a", "mine".to_string()).await.unwrap();
        assert!(store.is_loaded().await);

        backend.put_raw("db:items", r#"{"a":{"value":"theirs","expiresAt":null}}"#);

        assert!(wait_until_unloaded(&store).await);
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("theirs"));
    }

    #[tokio::test]
    async fn test_other_keys_ignored() {
        let backend = MemoryBackend::new();
        let cancel = CancellationToken::new();
        let store = store(&backend, &cancel);
        let _listener = ChangeListener::start(Arc::new(store.clone()), &backend);

        store.keys().await.unwrap();
        backend.put_raw("db:other", "{}");
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.is_loaded().await);
    }

    #[tokio::test]
    async fn test_own_writes_do_not_invalidate() {
        let backend = MemoryBackend::new();
        let cancel = CancellationToken::new();
        let store = store(&backend, &cancel);
        let _listener = ChangeListener::start(Arc::new(store.clone()), &backend);

        store.set("a", "mine".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.is_loaded().await);
        assert_eq!(backend.reads(), 1);
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let backend = MemoryBackend::new();
        let cancel = CancellationToken::new();
        let store = store(&backend, &cancel);
        let listener = ChangeListener::start(Arc::new(store), &backend);

        cancel.cancel();
        for _ in 0..100 {
            if !listener.is_active() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!listener.is_active());
    }

    #[tokio::test]
    async fn test_inactive_without_channel() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        let memory = MemoryBackend::new();
        let cancel = CancellationToken::new();

        let listener = ChangeListener::start(Arc::new(store(&memory, &cancel)), &backend);
        assert!(!listener.is_active());
    }
}
