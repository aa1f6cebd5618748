//! Process-wide OAuth client configuration.
//!
//! The protocol layer needs the client identity everywhere, so it is stored
//! once per process. Storage is *not* global: [`configure_oauth`] hands back
//! the opened [`OAuthDatabase`] and the caller owns it.
//!
//! Options can be written in TOML:
//!
//! ```toml
//! storage_name = "my-app"
//!
//! [metadata]
//! client_id = "https://app.example.com/client-metadata.json"
//! redirect_uri = "https://app.example.com/callback"
//!
//! [cleanup]
//! interval_secs = 300
//! ```

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::SharedBackend;
use crate::config::{
    CleanupConfig, DEFAULT_CLEANUP_INTERVAL, DEFAULT_STARTUP_DELAY, DEFAULT_STORAGE_NAME,
    DatabaseOptions,
};
use crate::database::OAuthDatabase;
use crate::error::ConfigError;

static CLIENT_METADATA: OnceLock<ClientMetadata> = OnceLock::new();

/// Identity of this OAuth client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub client_id: String,
    pub redirect_uri: String,
}

impl ClientMetadata {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
        }
    }
}

/// `[cleanup]` table of the options file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSection {
    pub enabled: bool,
    pub startup_delay_secs: u64,
    pub interval_secs: u64,
}

impl Default for CleanupSection {
    fn default() -> Self {
        Self {
            enabled: true,
            startup_delay_secs: DEFAULT_STARTUP_DELAY.as_secs(),
            interval_secs: DEFAULT_CLEANUP_INTERVAL.as_secs(),
        }
    }
}

impl From<CleanupSection> for CleanupConfig {
    fn from(section: CleanupSection) -> Self {
        CleanupConfig::new()
            .with_enabled(section.enabled)
            .with_startup_delay(Duration::from_secs(section.startup_delay_secs))
            .with_interval(Duration::from_secs(section.interval_secs))
    }
}

/// Everything [`configure_oauth`] needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureOptions {
    pub metadata: ClientMetadata,

    /// Record key prefix; defaults to `atcute-oauth`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,

    #[serde(default)]
    pub cleanup: CleanupSection,
}

impl ConfigureOptions {
    pub fn new(metadata: ClientMetadata) -> Self {
        Self {
            metadata,
            storage_name: None,
            cleanup: CleanupSection::default(),
        }
    }

    /// Override the record key prefix.
    pub fn with_storage_name(mut self, name: impl Into<String>) -> Self {
        self.storage_name = Some(name.into());
        self
    }

    /// Parse options from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Database options derived from these settings.
    pub fn database_options(&self) -> DatabaseOptions {
        let name = self
            .storage_name
            .clone()
            .unwrap_or_else(|| DEFAULT_STORAGE_NAME.to_string());
        DatabaseOptions::new(name).with_cleanup(self.cleanup.clone().into())
    }
}

/// Load options from a TOML file.
pub fn load_options(path: &Path) -> Result<ConfigureOptions, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!(path = %path.display(), "Loaded OAuth options");
    ConfigureOptions::from_toml(&contents)
}

/// Record the client identity for this process.
///
/// Setting the same identity again is accepted; a different one is
/// [`ConfigError::AlreadyConfigured`].
pub fn set_client_metadata(metadata: ClientMetadata) -> Result<(), ConfigError> {
    let stored = CLIENT_METADATA.get_or_init(|| metadata.clone());
    if *stored != metadata {
        return Err(ConfigError::AlreadyConfigured {
            client_id: stored.client_id.clone(),
        });
    }
    Ok(())
}

/// Record the client identity and open the database on `backend`.
pub async fn configure_oauth(
    options: ConfigureOptions,
    backend: SharedBackend,
) -> Result<OAuthDatabase, ConfigError> {
    set_client_metadata(options.metadata.clone())?;
    let db = OAuthDatabase::open(options.database_options(), backend).await?;
    info!(client_id = %options.metadata.client_id, database = %db.name(), "OAuth client configured");
    Ok(db)
}

/// Client identity, if configured.
pub fn client_metadata() -> Option<&'static ClientMetadata> {
    CLIENT_METADATA.get()
}

pub fn client_id() -> Option<&'static str> {
    client_metadata().map(|m| m.client_id.as_str())
}

pub fn redirect_uri() -> Option<&'static str> {
    client_metadata().map(|m| m.redirect_uri.as_str())
}
