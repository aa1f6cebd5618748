//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use oauthdb::types::{
    AuthorizationServerMetadata, DpopKey, PendingAuthorization, Session, SessionInfo, TokenSet,
};
use oauthdb::{
    CleanupConfig, DatabaseOptions, LockManager, ManualClock, MemoryBackend, OAuthDatabase,
};

pub const DB_NAME: &str = "it";

pub fn server() -> AuthorizationServerMetadata {
    AuthorizationServerMetadata::new(
        "https://auth.example.com",
        "https://auth.example.com/oauth/authorize",
        "https://auth.example.com/oauth/token",
    )
}

/// A session for `sub` carrying `token`.
pub fn session(sub: &str, token: TokenSet) -> Session {
    Session {
        dpop_key: DpopKey::new("ES256", "private-jwk"),
        info: SessionInfo {
            sub: sub.to_string(),
            aud: "https://pds.example.com".to_string(),
            server: server(),
        },
        token,
    }
}

pub fn pending() -> PendingAuthorization {
    PendingAuthorization {
        dpop_key: DpopKey::new("ES256", "ephemeral-jwk"),
        metadata: server(),
        verifier: Some("pkce-verifier".to_string()),
    }
}

/// One execution context: a database and its own handle on the shared storage.
pub struct Context {
    pub backend: MemoryBackend,
    pub db: OAuthDatabase,
}

/// Open a context without background cleanup.
pub async fn context(backend: MemoryBackend, clock: &ManualClock) -> Result<Context> {
    let db = OAuthDatabase::builder(DatabaseOptions::new(DB_NAME), Arc::new(backend.clone()))
        .with_clock(clock.clone())
        .with_cleanup(CleanupConfig::new().with_enabled(false))
        .open()
        .await?;
    Ok(Context { backend, db })
}

/// Open a context with the default cleanup schedule guarded by `locks`.
pub async fn context_with_cleanup(
    backend: MemoryBackend,
    clock: &ManualClock,
    locks: Arc<dyn LockManager>,
) -> Result<Context> {
    let db = OAuthDatabase::builder(DatabaseOptions::new(DB_NAME), Arc::new(backend.clone()))
        .with_clock(clock.clone())
        .with_lock_manager(locks)
        .open()
        .await?;
    Ok(Context { backend, db })
}

/// Total backend traffic of a context.
pub fn calls(backend: &MemoryBackend) -> usize {
    backend.reads() + backend.writes()
}
