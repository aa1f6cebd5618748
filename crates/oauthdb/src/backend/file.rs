//! File-based storage backend.
//!
//! Each record lives in its own `<url-encoded key>.json` file inside one
//! directory. Each write goes to its own uniquely named temporary file that
//! is renamed into place, so a concurrent reader sees either the old or the
//! new record, never half of one, and concurrent writers never collide.
//!
//! With [`FileBackend::watched`] the directory is monitored with `notify` and
//! every settled change to a record file is published as a
//! [`StorageChange`]. This is how separate processes sharing the directory
//! observe each other's writes. The filesystem does not say who wrote, so a
//! context also hears about its own writes and simply reloads.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{CHANGE_CHANNEL_CAPACITY, StorageBackend, StorageChange};
use crate::error::{BackendError, BackendResult};

/// Default debounce window for filesystem notifications.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

const RECORD_EXTENSION: &str = "json";

/// [`StorageBackend`] storing one JSON file per record.
pub struct FileBackend {
    dir: PathBuf,
    changes: Option<broadcast::Sender<StorageChange>>,
    /// Keeps the watcher alive; dropping it stops notifications.
    _debouncer: Option<Mutex<Debouncer<notify::RecommendedWatcher>>>,
}

impl FileBackend {
    /// Create a backend without change notifications.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            changes: None,
            _debouncer: None,
        }
    }

    /// Create a backend that watches its directory for writes.
    ///
    /// The directory is created if it does not exist yet.
    pub fn watched(dir: impl Into<PathBuf>) -> BackendResult<Self> {
        Self::watched_with_debounce(dir, Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    /// Like [`watched`](Self::watched) with a custom debounce window.
    pub fn watched_with_debounce(dir: impl Into<PathBuf>, debounce: Duration) -> BackendResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let tx = changes.clone();
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        if let Some(key) = key_for_path(&event.path) {
                            debug!(key = %key, "Record file changed");
                            // Nobody listening is fine.
                            let _ = tx.send(StorageChange::new(key));
                        }
                    }
                }
                Err(e) => error!("File watcher error: {:?}", e),
            }
        })
        .map_err(|e| BackendError::Watch(format!("failed to create debouncer: {}", e)))?;

        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| BackendError::Watch(format!("failed to watch {}: {}", dir.display(), e)))?;

        info!(
            dir = %dir.display(),
            debounce_ms = debounce.as_millis() as u64,
            "Watching storage directory"
        );

        Ok(Self {
            dir,
            changes: Some(changes),
            _debouncer: Some(Mutex::new(debouncer)),
        })
    }

    /// Directory holding the record files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", urlencoding::encode(key), RECORD_EXTENSION))
    }
}

impl fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBackend")
            .field("dir", &self.dir)
            .field("watched", &self.changes.is_some())
            .finish()
    }
}

/// Map a record file path back to its record key.
fn key_for_path(path: &Path) -> Option<String> {
    if path.extension()?.to_str()? != RECORD_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    urlencoding::decode(stem).ok().map(|k| k.into_owned())
}

/// Write `contents` to `path` through a fresh temporary file in `dir`.
fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".record-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        match tokio::fs::read_to_string(self.record_path(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> BackendResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let dir = self.dir.clone();
        let path = self.record_path(key);
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, value.as_bytes()))
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }

    fn watch(&self) -> Option<broadcast::Receiver<StorageChange>> {
        self.changes.as_ref().map(|tx| tx.subscribe())
    }

    async fn health_check(&self) -> BackendResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            BackendError::Unavailable(format!(
                "cannot create storage directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let metadata = tokio::fs::metadata(&self.dir).await?;
        if metadata.permissions().readonly() {
            return Err(BackendError::Unavailable(format!(
                "storage directory {} is read-only",
                self.dir.display()
            )));
        }
        Ok(())
    }
}
