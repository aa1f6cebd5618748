//! Config command - show resolved settings.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {}

/// Run the config command.
pub async fn run(_args: ConfigArgs, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let value = serde_json::json!({
            "dir": ctx.dir,
            "name": ctx.name,
            "options": ctx.options,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Configuration").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!("directory  {}", ctx.dir.display());
    println!("name       {}", ctx.name);

    match &ctx.options {
        Some(options) => {
            let cleanup = options.database_options().cleanup;
            println!("client_id  {}", options.metadata.client_id);
            println!("redirect   {}", options.metadata.redirect_uri);
            println!(
                "cleanup    {} (first after {}s, every {}s)",
                if cleanup.enabled { "enabled" } else { "disabled" },
                cleanup.startup_delay.as_secs(),
                cleanup.interval.as_secs()
            );
        }
        None => println!("{}", dim.apply_to("No options file loaded")),
    }
    Ok(())
}
