//! The database facade: the named partitions of one execution context.

use std::fmt;
use std::sync::Arc;

use oauthdb_types::{PendingAuthorization, Session};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::SharedBackend;
use crate::cleanup::CleanupCoordinator;
use crate::config::{CleanupConfig, DPOP_NONCE_TTL, DatabaseOptions, STATE_TTL};
use crate::error::{Result, StoreError};
use crate::listener::ChangeListener;
use crate::lock::LockManager;
use crate::partition::{Partition, PartitionStore};
use crate::ttl::{Clock, SystemClock, fixed_ttl, from_value};

/// Partition holding established sessions, keyed by account DID.
pub const SESSIONS: &str = "sessions";

/// Partition holding pending authorizations, keyed by the OAuth `state`.
pub const STATES: &str = "states";

/// Partition holding DPoP nonces, keyed by server origin.
pub const DPOP_NONCES: &str = "dpopNonces";

/// Builder for [`OAuthDatabase`] with the optional collaborators.
pub struct DatabaseBuilder {
    options: DatabaseOptions,
    backend: SharedBackend,
    clock: Arc<dyn Clock>,
    locks: Option<Arc<dyn LockManager>>,
}

impl DatabaseBuilder {
    pub fn new(options: DatabaseOptions, backend: SharedBackend) -> Self {
        Self {
            options,
            backend,
            clock: Arc::new(SystemClock),
            locks: None,
        }
    }

    /// Use `clock` for expiry decisions instead of the system clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Guard cleanup sweeps with `locks`. Without one, sweeps run unguarded.
    pub fn with_lock_manager(mut self, locks: Arc<dyn LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Replace the cleanup configuration from the options.
    pub fn with_cleanup(mut self, cleanup: CleanupConfig) -> Self {
        self.options.cleanup = cleanup;
        self
    }

    /// Probe the backend and open the database.
    ///
    /// Fails with [`StoreError::BackendUnavailable`] if the probe fails.
    /// Must be called within a Tokio runtime; the listeners and cleanup tasks
    /// are spawned on it.
    pub async fn open(self) -> Result<OAuthDatabase> {
        let Self {
            options,
            backend,
            clock,
            locks,
        } = self;

        backend
            .health_check()
            .await
            .map_err(StoreError::BackendUnavailable)?;

        let cancel = CancellationToken::new();
        let name = options.name;

        let sessions = PartitionStore::new(
            &name,
            SESSIONS,
            Arc::clone(&backend),
            Arc::clone(&clock),
            from_value(|session: &Session| session.expires_at()),
            cancel.clone(),
        );
        let states = PartitionStore::new(
            &name,
            STATES,
            Arc::clone(&backend),
            Arc::clone(&clock),
            fixed_ttl(STATE_TTL),
            cancel.clone(),
        );
        let dpop_nonces = PartitionStore::new(
            &name,
            DPOP_NONCES,
            Arc::clone(&backend),
            Arc::clone(&clock),
            fixed_ttl(DPOP_NONCE_TTL),
            cancel.clone(),
        );

        let partitions: [Arc<dyn Partition>; 3] = [
            Arc::new(sessions.clone()),
            Arc::new(states.clone()),
            Arc::new(dpop_nonces.clone()),
        ];

        let coordinator = CleanupCoordinator::new(options.cleanup, locks);
        let mut listeners = Vec::with_capacity(partitions.len());
        let mut cleanup_tasks = Vec::with_capacity(partitions.len());
        for partition in partitions {
            listeners.push(ChangeListener::start(Arc::clone(&partition), backend.as_ref()));
            cleanup_tasks.extend(coordinator.spawn(partition));
        }

        info!(
            database = %name,
            cleanup_tasks = cleanup_tasks.len(),
            "OAuth database opened"
        );

        Ok(OAuthDatabase {
            name,
            sessions,
            states,
            dpop_nonces,
            cancel,
            listeners,
            cleanup_tasks,
        })
    }
}

impl fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("options", &self.options)
            .field("backend", &self.backend)
            .field("locks", &self.locks)
            .finish()
    }
}

/// One execution context's view of the OAuth store.
///
/// Owns the cancellation signal shared by all its partitions. Disposing (or
/// dropping) the database closes every partition at once: pending loads fail
/// with [`StoreError::Closed`], cleanup tasks stop and listeners unsubscribe.
#[derive(Debug)]
pub struct OAuthDatabase {
    name: String,
    sessions: PartitionStore<Session>,
    states: PartitionStore<PendingAuthorization>,
    dpop_nonces: PartitionStore<String>,
    cancel: CancellationToken,
    listeners: Vec<ChangeListener>,
    cleanup_tasks: Vec<JoinHandle<()>>,
}

impl OAuthDatabase {
    /// Open a database with default collaborators.
    pub async fn open(options: DatabaseOptions, backend: SharedBackend) -> Result<Self> {
        DatabaseBuilder::new(options, backend).open().await
    }

    pub fn builder(options: DatabaseOptions, backend: SharedBackend) -> DatabaseBuilder {
        DatabaseBuilder::new(options, backend)
    }

    /// Namespace prefix of the record keys.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sessions(&self) -> &PartitionStore<Session> {
        &self.sessions
    }

    pub fn states(&self) -> &PartitionStore<PendingAuthorization> {
        &self.states
    }

    pub fn dpop_nonces(&self) -> &PartitionStore<String> {
        &self.dpop_nonces
    }

    /// Number of running change listeners.
    pub fn active_listeners(&self) -> usize {
        self.listeners.iter().filter(|l| l.is_active()).count()
    }

    /// Sweep every partition now, bypassing the cleanup schedule.
    ///
    /// Returns the total number of entries removed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let sessions = self.sessions.sweep_expired().await?;
        let states = self.states.sweep_expired().await?;
        let nonces = self.dpop_nonces.sweep_expired().await?;
        Ok(sessions + states + nonces)
    }

    /// Close every partition. Calling it again has no effect.
    pub fn dispose(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        info!(database = %self.name, "OAuth database disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Dispose and wait for the cleanup tasks to finish.
    pub async fn shutdown(mut self) {
        self.dispose();
        for task in std::mem::take(&mut self.cleanup_tasks) {
            if let Err(e) = task.await {
                debug!(error = %e, "Cleanup task ended abnormally");
            }
        }
    }
}

impl Drop for OAuthDatabase {
    fn drop(&mut self) {
        self.dispose();
    }
}
