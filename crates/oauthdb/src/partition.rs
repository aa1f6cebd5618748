//! Partition stores: one lazily cached record per named collection.
//!
//! A partition keeps its whole `key -> Entry` map in a single backend record
//! under `"<database>:<partition>"`. The map is read on first access and then
//! served from memory until it is invalidated. Every mutation writes the
//! entire map back.
//!
//! # Consistency
//!
//! Within one context, operations run one at a time against the cache: a call
//! made while the first load is in flight waits for it. The backend write
//! happens after the cache lock is released, so among operations completing
//! concurrently the last persist wins. Across contexts the backend's own write
//! order decides.
//!
//! # Failure handling
//!
//! Availability is favoured over durability. A failed or unreadable load is
//! logged and the operation proceeds as if the record were empty (that view is
//! not cached). A failed persist is logged and dropped. Neither reaches the
//! caller. The only errors callers see are [`StoreError::Closed`] after
//! disposal and [`StoreError::Serialization`] for values that cannot be
//! encoded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::backend::SharedBackend;
use crate::error::{Result, StoreError};
use crate::ttl::{Clock, Entry, ExpiryPolicy};

/// Values that can live in a partition.
pub trait StoreValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// In-memory shape of a partition record.
pub type Record<V> = HashMap<String, Entry<V>>;

/// Backend key of a partition's record.
pub fn record_key(database: &str, partition: &str) -> String {
    format!("{}:{}", database, partition)
}

/// Type-erased view of a partition used by the maintenance machinery.
#[async_trait]
pub trait Partition: Send + Sync {
    /// Partition name (e.g. `sessions`).
    fn name(&self) -> &str;

    /// Backend key of the partition's record.
    fn record_key(&self) -> &str;

    /// Cancellation signal of the owning database.
    fn cancellation(&self) -> &CancellationToken;

    /// Discard the cached record.
    async fn invalidate(&self);

    /// Remove every expired entry; returns how many were removed.
    async fn sweep_expired(&self) -> Result<usize>;
}

struct Inner<V> {
    name: String,
    record_key: String,
    backend: SharedBackend,
    clock: Arc<dyn Clock>,
    policy: ExpiryPolicy<V>,
    /// `None` until loaded, and again after invalidation.
    cache: Mutex<Option<Record<V>>>,
    cancel: CancellationToken,
}

/// TTL-aware key-value store over one backend record.
///
/// Cheap to clone; clones share the cache.
pub struct PartitionStore<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for PartitionStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for PartitionStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionStore")
            .field("name", &self.inner.name)
            .field("record_key", &self.inner.record_key)
            .finish()
    }
}

impl<V: StoreValue> PartitionStore<V> {
    /// Create a partition of `database` named `name`.
    ///
    /// Nothing is read until the first operation.
    pub fn new(
        database: &str,
        name: &str,
        backend: SharedBackend,
        clock: Arc<dyn Clock>,
        policy: ExpiryPolicy<V>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                record_key: record_key(database, name),
                backend,
                clock,
                policy,
                cache: Mutex::new(None),
                cancel,
            }),
        }
    }

    /// Partition name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Backend key of this partition's record.
    pub fn record_key(&self) -> &str {
        &self.inner.record_key
    }

    /// Whether the record is currently cached.
    pub async fn is_loaded(&self) -> bool {
        self.inner.cache.lock().await.is_some()
    }

    /// Look up a live value.
    ///
    /// An expired entry found here is removed and the record persisted; it is
    /// never returned.
    pub async fn get(&self, key: &str) -> Result<Option<V>> {
        let record_key = &self.inner.record_key;
        self.apply(|record, now| {
            let Some(entry) = record.get(key) else {
                return (None, false);
            };
            if !entry.is_expired(now) {
                trace!(record_key = %record_key, key = %key, "Cache hit");
                return (Some(entry.value.clone()), false);
            }
            record.remove(key);
            debug!(record_key = %record_key, key = %key, "Entry expired, removing");
            (None, true)
        })
        .await
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// The expiry is computed from the value now and never revisited.
    pub async fn set(&self, key: &str, value: V) -> Result<()> {
        let policy = &self.inner.policy;
        self.apply(|record, now| {
            let expires_at = policy(&value, now);
            record.insert(key.to_string(), Entry::new(value, expires_at));
            ((), true)
        })
        .await
    }

    /// Remove `key`. Returns whether it was present; nothing is written when
    /// it was not.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.apply(|record, _| {
            let removed = record.remove(key).is_some();
            (removed, removed)
        })
        .await
    }

    /// All stored keys, including expired entries not yet swept.
    ///
    /// Use [`get`](Self::get) when freshness matters.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.apply(|record, _| (record.keys().cloned().collect(), false))
            .await
    }

    /// Remove every expired entry, persisting once if anything went.
    pub async fn sweep_expired(&self) -> Result<usize> {
        self.apply(|record, now| {
            let before = record.len();
            record.retain(|_, entry| !entry.is_expired(now));
            let removed = before - record.len();
            (removed, removed > 0)
        })
        .await
    }

    /// Drop the cached record so the next operation reloads it.
    pub async fn invalidate(&self) {
        let mut cache = self.inner.cache.lock().await;
        if cache.take().is_some() {
            debug!(record_key = %self.inner.record_key, "Cache invalidated");
        }
    }

    /// Run `op` against the loaded record and persist if it reports a change.
    ///
    /// The snapshot is taken under the cache lock; the write happens after
    /// the lock is released.
    async fn apply<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Record<V>, i64) -> (R, bool),
    {
        let mut cache = self.inner.cache.lock().await;
        let durable = self.load(&mut cache).await?;

        let record = cache.get_or_insert_with(Record::new);
        let (result, changed) = op(record, self.inner.clock.now_ms());
        let snapshot = changed.then(|| self.encode(record)).transpose();

        // An unencodable change must not stay visible in the cache.
        if !durable || snapshot.is_err() {
            *cache = None;
        }
        drop(cache);

        if let Some(snapshot) = snapshot? {
            self.persist(snapshot).await?;
        }
        Ok(result)
    }

    /// Make sure `cache` holds a record.
    ///
    /// Returns whether it reflects the backend; a view built after a failed
    /// read must not outlive the current operation.
    async fn load(&self, cache: &mut Option<Record<V>>) -> Result<bool> {
        self.ensure_open()?;
        if cache.is_some() {
            return Ok(true);
        }

        let loaded = self.read().await?;
        let durable = loaded.is_some();
        *cache = Some(loaded.unwrap_or_default());
        Ok(durable)
    }

    /// Read and decode the record. `Ok(None)` means the read failed and was
    /// logged.
    async fn read(&self) -> Result<Option<Record<V>>> {
        let record_key = &self.inner.record_key;
        let raw = tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => return Err(StoreError::Closed),
            raw = self.inner.backend.get(record_key) => raw,
        };

        match raw {
            Ok(None) => {
                debug!(record_key = %record_key, "No stored record, starting empty");
                Ok(Some(Record::new()))
            }
            Ok(Some(text)) => match serde_json::from_str::<Record<V>>(&text) {
                Ok(record) => {
                    debug!(record_key = %record_key, entries = record.len(), "Record loaded");
                    Ok(Some(record))
                }
                Err(e) => {
                    warn!(record_key = %record_key, error = %e, "Stored record is unreadable, treating as empty");
                    Ok(None)
                }
            },
            Err(e) => {
                warn!(record_key = %record_key, error = %e, "Failed to read record, treating as empty");
                Ok(None)
            }
        }
    }

    async fn persist(&self, snapshot: String) -> Result<()> {
        let record_key = &self.inner.record_key;
        tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => Err(StoreError::Closed),
            result = self.inner.backend.set(record_key, snapshot) => {
                match result {
                    Ok(()) => trace!(record_key = %record_key, "Record persisted"),
                    Err(e) => warn!(record_key = %record_key, error = %e, "Failed to persist record, write dropped"),
                }
                Ok(())
            }
        }
    }

    fn encode(&self, record: &Record<V>) -> Result<String> {
        serde_json::to_string(record).map_err(|source| StoreError::Serialization {
            record_key: self.inner.record_key.clone(),
            source,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl<V: StoreValue> Partition for PartitionStore<V> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn record_key(&self) -> &str {
        &self.inner.record_key
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    async fn invalidate(&self) {
        PartitionStore::invalidate(self).await
    }

    async fn sweep_expired(&self) -> Result<usize> {
        PartitionStore::sweep_expired(self).await
    }
}
