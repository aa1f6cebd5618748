//! Storage backend adapters.
//!
//! The store never talks to a storage facility directly. It reads and writes
//! whole records (one per partition) as JSON text through the
//! [`StorageBackend`] trait, which keeps it agnostic to whether the facility
//! stores structured values or flat strings.
//!
//! # Architecture
//!
//! ```text
//! StorageBackend (trait)   - get/set of whole records + change notifications
//!     └── MemoryBackend    - in-process, sibling contexts share one map
//!     └── FileBackend      - one JSON file per record, optional fs watching
//! ```

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::BackendResult;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Capacity of the change notification channels.
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification that a record was written by some execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Key of the record that was written.
    pub key: String,
}

impl StorageChange {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Uniform async facade over a persistent storage facility.
///
/// The backend is injected by the application when a database is opened;
/// the store never probes the host for one.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Read the serialized record stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing was ever written there.
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Replace the record stored under `key`.
    async fn set(&self, key: &str, value: String) -> BackendResult<()>;

    /// Subscribe to writes made by other execution contexts.
    ///
    /// `None` means the facility has no notification channel; caches then
    /// only refresh when they reload on their own.
    fn watch(&self) -> Option<broadcast::Receiver<StorageChange>> {
        None
    }

    /// Check that the facility is usable. Called once when a database opens.
    async fn health_check(&self) -> BackendResult<()> {
        Ok(())
    }
}

/// Shared handle to a storage backend.
pub type SharedBackend = Arc<dyn StorageBackend>;
