//! In-process storage backend.
//!
//! A [`MemoryBackend`] is one execution context's view of a shared map.
//! [`sibling`](MemoryBackend::sibling) creates another context over the same
//! map: writes made through one context are delivered as [`StorageChange`]
//! notifications to every *other* context, the way a browser delivers storage
//! events to sibling tabs but not to the tab that wrote.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

use super::{CHANGE_CHANNEL_CAPACITY, StorageBackend, StorageChange};
use crate::error::{BackendError, BackendResult};

/// State shared by every context of one memory backend.
#[derive(Debug, Default)]
struct Shared {
    records: RwLock<HashMap<String, String>>,
    /// Notification sender of each context, keyed by context id.
    subscribers: RwLock<Vec<(u64, broadcast::Sender<StorageChange>)>>,
    next_context: AtomicU64,
    unavailable: AtomicBool,
}

/// Per-context call counters, handy for asserting on backend traffic.
#[derive(Debug, Default)]
struct Counters {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

/// In-memory [`StorageBackend`] with sibling-context notifications.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
    context: u64,
    changes: broadcast::Sender<StorageChange>,
    counters: Arc<Counters>,
}

impl MemoryBackend {
    /// Create an empty backend with a single context.
    pub fn new() -> Self {
        Self::attach(Arc::new(Shared::default()))
    }

    /// Create a new execution context over the same records.
    pub fn sibling(&self) -> Self {
        Self::attach(Arc::clone(&self.shared))
    }

    fn attach(shared: Arc<Shared>) -> Self {
        let context = shared.next_context.fetch_add(1, Ordering::SeqCst);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        shared.subscribers.write().push((context, changes.clone()));
        Self {
            shared,
            context,
            changes,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Raw record text, bypassing counters and availability.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.shared.records.read().get(key).cloned()
    }

    /// Write a record directly, notifying every context including this one.
    ///
    /// Simulates a write by a context that has no `MemoryBackend` handle,
    /// such as another process.
    pub fn put_raw(&self, key: &str, value: impl Into<String>) {
        self.shared
            .records
            .write()
            .insert(key.to_string(), value.into());
        self.notify(key, None);
    }

    /// Make every call on every context fail, as when the host tears down
    /// its storage facility, or restore it.
    pub fn set_available(&self, available: bool) {
        self.shared.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of `get` calls made through this context.
    pub fn reads(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Number of `set` calls made through this context.
    pub fn writes(&self) -> usize {
        self.counters.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> BackendResult<()> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(
                "memory backend torn down".to_string(),
            ));
        }
        Ok(())
    }

    fn notify(&self, key: &str, skip: Option<u64>) {
        for (context, tx) in self.shared.subscribers.read().iter() {
            if Some(*context) == skip {
                continue;
            }
            // No receivers just means nobody is listening in that context.
            let _ = tx.send(StorageChange::new(key));
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.shared.records.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> BackendResult<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.shared.records.write().insert(key.to_string(), value);
        trace!(key = %key, context = self.context, "Record written");
        self.notify(key, Some(self.context));
        Ok(())
    }

    fn watch(&self) -> Option<broadcast::Receiver<StorageChange>> {
        Some(self.changes.subscribe())
    }

    async fn health_check(&self) -> BackendResult<()> {
        self.check_available()
    }
}
