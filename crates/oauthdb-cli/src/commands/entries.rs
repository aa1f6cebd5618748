//! Entry commands - list, show and remove stored values.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use oauthdb::{PartitionStore, Record, StorageBackend, StoreValue, record_key};
use serde_json::Value;

use super::{Context, PartitionArg, format_expiry};

/// Arguments for the keys command.
#[derive(Args, Debug)]
pub struct KeysArgs {
    /// Partition to list
    #[arg(value_enum)]
    pub partition: PartitionArg,
}

/// Arguments for the get command.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Partition to read from
    #[arg(value_enum)]
    pub partition: PartitionArg,

    /// Entry key
    pub key: String,
}

/// Arguments for the delete command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Partition to delete from
    #[arg(value_enum)]
    pub partition: PartitionArg,

    /// Entry key
    pub key: String,
}

/// List keys with their expiry, straight from the stored record.
///
/// Expired entries that were not swept yet are listed and marked.
pub async fn keys(args: KeysArgs, ctx: &Context) -> Result<()> {
    let key = record_key(&ctx.name, args.partition.name());
    let record: Record<Value> = match ctx.backend().get(&key).await? {
        Some(text) => serde_json::from_str(&text)?,
        None => Record::new(),
    };

    let now = chrono::Utc::now().timestamp_millis();
    let mut entries: Vec<_> = record.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if ctx.json_output {
        let listing: Vec<Value> = entries
            .iter()
            .map(|(k, entry)| {
                serde_json::json!({
                    "key": k,
                    "expiresAt": entry.expires_at,
                    "expired": entry.is_expired(now),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style(&key).bold());
    println!("{}", dim.apply_to("─".repeat(50)));

    if entries.is_empty() {
        println!("{}", dim.apply_to("No entries"));
        return Ok(());
    }

    let yellow = Style::new().yellow();
    for (k, entry) in &entries {
        let expiry = format_expiry(entry.expires_at);
        if entry.is_expired(now) {
            println!("{}  {}", k, yellow.apply_to(format!("expired {}", expiry)));
        } else {
            println!("{}  {}", k, dim.apply_to(format!("expires {}", expiry)));
        }
    }
    if ctx.verbose {
        println!();
        println!("{}", dim.apply_to(format!("{} entries", entries.len())));
    }
    Ok(())
}

/// Print a live value. Expired entries are removed on the way, as any read
/// through the store does.
pub async fn get(args: GetArgs, ctx: &Context) -> Result<()> {
    let db = ctx.open().await?;
    let value = match args.partition {
        PartitionArg::Sessions => fetch(db.sessions(), &args.key).await?,
        PartitionArg::States => fetch(db.states(), &args.key).await?,
        PartitionArg::DpopNonces => fetch(db.dpop_nonces(), &args.key).await?,
    };
    db.shutdown().await;

    let Some(value) = value else {
        bail!("no live entry '{}' in {}", args.key, args.partition.name());
    };
    if ctx.json_output {
        println!("{}", serde_json::to_string(&value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

pub async fn delete(args: DeleteArgs, ctx: &Context) -> Result<()> {
    let db = ctx.open().await?;
    let removed = match args.partition {
        PartitionArg::Sessions => db.sessions().delete(&args.key).await?,
        PartitionArg::States => db.states().delete(&args.key).await?,
        PartitionArg::DpopNonces => db.dpop_nonces().delete(&args.key).await?,
    };
    db.shutdown().await;

    if ctx.json_output {
        println!("{}", serde_json::json!({ "key": args.key, "removed": removed }));
    } else if removed {
        let green = Style::new().green();
        println!("{} Deleted {}", green.apply_to("✓"), args.key);
    } else {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(format!("No entry '{}'", args.key)));
    }
    Ok(())
}

async fn fetch<V: StoreValue>(store: &PartitionStore<V>, key: &str) -> Result<Option<Value>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::to_value(value)?)),
        None => Ok(None),
    }
}
