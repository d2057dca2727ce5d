//! Config commands
//!
//! Commands for inspecting the resolved gateway configuration.

use anyhow::Result;
use clap::Subcommand;
use fintrack_core::GatewayConfig;
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::{print_info, print_output};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
}

/// Config row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub async fn execute(ctx: &Context, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show_config(ctx).await,
        ConfigAction::Get { key } => get_config(ctx, key).await,
    }
}

async fn show_config(ctx: &Context) -> Result<()> {
    print_output(&config_rows(&ctx.config), ctx.format)
}

async fn get_config(ctx: &Context, key: String) -> Result<()> {
    let rows = config_rows(&ctx.config);
    match rows.iter().find(|r| r.key.eq_ignore_ascii_case(&key)) {
        Some(row) => {
            print_info(&format!("{} = {}", row.key, row.value), ctx.quiet);
            Ok(())
        }
        None => anyhow::bail!("Config key not found: {}", key),
    }
}

fn config_rows(config: &GatewayConfig) -> Vec<ConfigRow> {
    let row = |key: &str, value: String| ConfigRow {
        key: key.to_string(),
        value,
    };

    vec![
        row("data_dir", config.data_dir.display().to_string()),
        row("backend", config.backend.to_string()),
        row("plans_path", config.plans_path.display().to_string()),
        row("db_path", config.db_path.display().to_string()),
        row("upstream_timeout_secs", config.upstream_timeout_secs.to_string()),
        row("failure_threshold", config.failure_threshold.to_string()),
        row("cooldown_secs", config.cooldown_secs.to_string()),
    ]
}
