//! TTL-aware persistence for an OAuth client.
//!
//! This crate stores the short-lived and long-lived state of an OAuth client
//! on a pluggable storage backend:
//! - Sessions, expiring with their access token unless refreshable
//! - Pending authorization states and DPoP nonces, expiring after 10 minutes
//! - Lazy in-memory caching, invalidated when another context writes
//! - Lock-guarded periodic cleanup of expired entries
//!
//! Several independent databases (contexts) may share one backing storage;
//! each keeps its own cache and they coordinate through change notifications
//! and a named lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oauthdb::{DatabaseOptions, FileBackend, OAuthDatabase};
//!
//! let backend = Arc::new(FileBackend::watched("/var/lib/my-app/oauth")?);
//! let db = OAuthDatabase::open(DatabaseOptions::new("my-app"), backend).await?;
//!
//! db.dpop_nonces().set("https://bsky.social", nonce).await?;
//! let session = db.sessions().get("did:plc:alice").await?;
//!
//! db.dispose();
//! ```

pub mod backend;
mod cleanup;
mod config;
mod database;
mod environment;
mod error;
mod listener;
mod lock;
mod partition;
mod ttl;

pub use backend::{FileBackend, MemoryBackend, SharedBackend, StorageBackend, StorageChange};
pub use cleanup::{CleanupCoordinator, CleanupOutcome};
pub use config::{
    CleanupConfig, DEFAULT_CLEANUP_INTERVAL, DEFAULT_STARTUP_DELAY, DEFAULT_STORAGE_NAME,
    DPOP_NONCE_TTL, DatabaseOptions, STATE_TTL,
};
pub use database::{DPOP_NONCES, DatabaseBuilder, OAuthDatabase, SESSIONS, STATES};
pub use environment::{
    CleanupSection, ClientMetadata, ConfigureOptions, client_id, client_metadata,
    configure_oauth, load_options, redirect_uri, set_client_metadata,
};
pub use error::{BackendError, BackendResult, ConfigError, Result, StoreError};
pub use listener::ChangeListener;
pub use lock::{LocalLockManager, LockGuard, LockManager};
pub use partition::{Partition, PartitionStore, Record, StoreValue, record_key};
pub use ttl::{Clock, Entry, ExpiryPolicy, ManualClock, SystemClock, fixed_ttl, from_value, never_expires};

pub use oauthdb_types as types;
