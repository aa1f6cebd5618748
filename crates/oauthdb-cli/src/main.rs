//! oauthdb - inspect and maintain OAuth client stores
//!
//! Main entry point for the oauthdb CLI. Works on the directory layout of
//! `FileBackend`: one JSON file per partition record.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, entries, sweep};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// oauthdb - inspect and maintain OAuth client stores
#[derive(Parser)]
#[command(name = "oauthdb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Storage directory (default: <data dir>/oauthdb)
    #[arg(long, global = true, env = "OAUTHDB_DIR")]
    pub dir: Option<PathBuf>,

    /// Database name, the prefix of every record key
    #[arg(long, global = true, env = "OAUTHDB_NAME")]
    pub name: Option<String>,

    /// Options file (TOML) to take the storage name from
    #[arg(long, global = true, env = "OAUTHDB_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the keys of a partition
    Keys(entries::KeysArgs),

    /// Print a stored value
    Get(entries::GetArgs),

    /// Remove a stored value
    Delete(entries::DeleteArgs),

    /// Remove expired entries from every partition
    Sweep(sweep::SweepArgs),

    /// Show the resolved settings
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "oauthdb=debug,oauthdb_cli=debug,info"
    } else {
        "oauthdb=warn,oauthdb_cli=info,warn"
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let ctx = commands::Context::resolve(cli.dir, cli.name, cli.config, cli.json, cli.verbose)?;

    match cli.command {
        Commands::Keys(args) => entries::keys(args, &ctx).await,
        Commands::Get(args) => entries::get(args, &ctx).await,
        Commands::Delete(args) => entries::delete(args, &ctx).await,
        Commands::Sweep(args) => sweep::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
