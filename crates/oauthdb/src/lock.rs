//! Named advisory locks for cooperative maintenance.
//!
//! Locks only keep execution contexts from doing the same cleanup work at the
//! same time. Ordinary reads and writes never take them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Proof of holding a named lock. The lock is released on drop.
pub struct LockGuard {
    name: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    /// Create a guard that runs `release` when dropped.
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    /// Name of the held lock.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("name", &self.name).finish()
    }
}

/// A named-mutex service with non-blocking acquisition.
#[async_trait]
pub trait LockManager: Send + Sync + fmt::Debug {
    /// Acquire `name` if nobody holds it. Never waits behind another holder:
    /// returns `None` immediately when the lock is taken.
    async fn try_acquire(&self, name: &str) -> Option<LockGuard>;
}

/// Lock service for contexts living in the same process.
///
/// Clones share the lock table; hand the same instance to every database that
/// should coordinate.
#[derive(Debug, Clone, Default)]
pub struct LocalLockManager {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.held.lock().contains(name)
    }
}

#[async_trait]
impl LockManager for LocalLockManager {
    async fn try_acquire(&self, name: &str) -> Option<LockGuard> {
        if !self.held.lock().insert(name.to_string()) {
            return None;
        }

        let held = Arc::clone(&self.held);
        let owned = name.to_string();
        Some(LockGuard::new(name, move || {
            held.lock().remove(&owned);
        }))
    }
}
