//! CLI command handlers.

pub mod config;
pub mod entries;
pub mod sweep;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::ValueEnum;
use oauthdb::{
    CleanupConfig, ConfigureOptions, DEFAULT_STORAGE_NAME, DPOP_NONCES, DatabaseOptions,
    FileBackend, OAuthDatabase, SESSIONS, STATES, load_options,
};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory holding the record files.
    pub dir: PathBuf,
    /// Database name (record key prefix).
    pub name: String,
    /// Options loaded from `--config`, if any.
    pub options: Option<ConfigureOptions>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Resolve flags, environment and options file into a context.
    ///
    /// The name comes from `--name`, then the options file's `storage_name`,
    /// then the default.
    pub fn resolve(
        dir: Option<PathBuf>,
        name: Option<String>,
        config: Option<PathBuf>,
        json_output: bool,
        verbose: bool,
    ) -> Result<Self> {
        let dir = match dir {
            Some(dir) => dir,
            None => dirs::data_dir()
                .map(|d| d.join("oauthdb"))
                .context("could not determine a data directory, pass --dir")?,
        };

        let options = config.as_deref().map(load_options).transpose()?;
        let name = name
            .or_else(|| options.as_ref().and_then(|o| o.storage_name.clone()))
            .unwrap_or_else(|| DEFAULT_STORAGE_NAME.to_string());

        Ok(Self {
            dir,
            name,
            options,
            json_output,
            verbose,
        })
    }

    pub fn backend(&self) -> FileBackend {
        FileBackend::new(&self.dir)
    }

    /// Open the database for a one-shot command, without background cleanup.
    pub async fn open(&self) -> Result<OAuthDatabase> {
        let options = DatabaseOptions::new(&self.name)
            .with_cleanup(CleanupConfig::new().with_enabled(false));
        let db = OAuthDatabase::open(options, Arc::new(self.backend()))
            .await
            .with_context(|| format!("failed to open store in {}", self.dir.display()))?;
        Ok(db)
    }
}

/// Partition selector on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PartitionArg {
    Sessions,
    States,
    DpopNonces,
}

impl PartitionArg {
    /// Partition name as used in record keys.
    pub fn name(self) -> &'static str {
        match self {
            PartitionArg::Sessions => SESSIONS,
            PartitionArg::States => STATES,
            PartitionArg::DpopNonces => DPOP_NONCES,
        }
    }
}

/// Format a millisecond timestamp for display.
pub fn format_expiry(expires_at: Option<i64>) -> String {
    match expires_at.and_then(chrono::DateTime::from_timestamp_millis) {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_precedence() {
        let ctx = Context::resolve(Some("/tmp/x".into()), Some("cli".into()), None, false, false)
            .unwrap();
        assert_eq!(ctx.name, "cli");

        let ctx = Context::resolve(Some("/tmp/x".into()), None, None, false, false).unwrap();
        assert_eq!(ctx.name, DEFAULT_STORAGE_NAME);
    }

    #[test]
    fn test_name_from_options_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauthdb.toml");
        std::fs::write(
            &path,
            "storage_name = \"from-file\"\n[metadata]\nclient_id = \"c\"\nredirect_uri = \"r\"\n",
        )
        .unwrap();

        let ctx = Context::resolve(Some(dir.path().into()), None, Some(path), false, false).unwrap();
        assert_eq!(ctx.name, "from-file");
        assert!(ctx.options.is_some());
    }

    #[test]
    fn test_partition_names() {
        assert_eq!(PartitionArg::Sessions.name(), "sessions");
        assert_eq!(PartitionArg::States.name(), "states");
        assert_eq!(PartitionArg::DpopNonces.name(), "dpopNonces");
    }

    #[test]
    fn test_format_expiry() {
        assert_eq!(format_expiry(None), "never");
        assert_eq!(format_expiry(Some(0)), "1970-01-01 00:00:00 UTC");
    }
}
