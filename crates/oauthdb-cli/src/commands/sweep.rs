//! Sweep command - purge expired entries.

use anyhow::Result;
use clap::Args;
use console::Style;
use tracing::info;

use super::Context;

/// Arguments for the sweep command.
#[derive(Args, Debug)]
pub struct SweepArgs {}

/// Run the sweep command.
pub async fn run(_args: SweepArgs, ctx: &Context) -> Result<()> {
    let db = ctx.open().await?;
    let removed = db.sweep_expired().await?;
    db.shutdown().await;
    info!(removed, dir = %ctx.dir.display(), "Sweep finished");

    if ctx.json_output {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else {
        let green = Style::new().green();
        println!("{} Removed {} expired entries", green.apply_to("✓"), removed);
    }
    Ok(())
}
