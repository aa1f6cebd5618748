//! Configuration for the database and its cleanup schedule.

use std::time::Duration;

/// Default namespace prefix for record keys.
pub const DEFAULT_STORAGE_NAME: &str = "atcute-oauth";

/// Lifetime of a pending authorization state.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Lifetime of a cached DPoP nonce.
pub const DPOP_NONCE_TTL: Duration = Duration::from_secs(10 * 60);

/// Delay before the first sweep, so it does not race the initial load.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(10);

/// Time between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Cleanup scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Whether to run the periodic sweep at all.
    /// If false, expired entries are only purged when read.
    pub enabled: bool,

    /// Wait after acquiring the lock for the first sweep.
    pub startup_delay: Duration,

    /// Wait between sweep rounds.
    pub interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            startup_delay: DEFAULT_STARTUP_DELAY,
            interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl CleanupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the background sweep.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the delay before the first sweep.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Set the interval between sweeps.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Options for opening an [`OAuthDatabase`](crate::OAuthDatabase).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Namespace prefix of every record key (`"<name>:<partition>"`).
    pub name: String,

    pub cleanup: CleanupConfig,
}

impl DatabaseOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cleanup: CleanupConfig::default(),
        }
    }

    /// Replace the cleanup configuration.
    pub fn with_cleanup(mut self, cleanup: CleanupConfig) -> Self {
        self.cleanup = cleanup;
        self
    }
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_defaults() {
        let config = CleanupConfig::default();
        assert!(config.enabled);
        assert_eq!(config.startup_delay, Duration::from_secs(10));
        assert_eq!(config.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_builders() {
        let options = DatabaseOptions::new("app").with_cleanup(
            CleanupConfig::new()
                .with_enabled(false)
                .with_interval(Duration::from_secs(5)),
        );
        assert_eq!(options.name, "app");
        assert!(!options.cleanup.enabled);
        assert_eq!(options.cleanup.interval, Duration::from_secs(5));
        assert_eq!(DatabaseOptions::default().name, DEFAULT_STORAGE_NAME);
    }
}
