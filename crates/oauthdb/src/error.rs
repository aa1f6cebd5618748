//! Error types for store, backend and configuration operations.

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type for storage backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors surfaced to callers of the partition stores and the database.
///
/// A failed load or persist is *not* in this list: those are
/// logged and absorbed by [`PartitionStore`](crate::PartitionStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The owning database was disposed.
    #[error("store closed")]
    Closed,

    /// The storage backend failed its probe when the database was opened.
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(#[source] BackendError),

    /// A record could not be encoded for persistence.
    #[error("failed to serialize record '{record_key}': {source}")]
    Serialization {
        record_key: String,
        source: serde_json::Error,
    },
}

/// Errors reported by a [`StorageBackend`](crate::backend::StorageBackend).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Filesystem or other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host storage facility is gone (torn down, not mounted, ...).
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Change watching could not be set up.
    #[error("failed to watch storage: {0}")]
    Watch(String),
}

/// Errors from loading options and configuring the process environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read an options file.
    #[error("failed to read options file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),

    /// Client metadata was already configured with different values.
    #[error("OAuth client already configured as '{client_id}'")]
    AlreadyConfigured { client_id: String },

    /// Opening the database failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
