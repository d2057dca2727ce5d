//! Key pool commands
//!
//! Commands for managing the upstream API keys the gateway rotates through.
//! Raw keys are never printed; listings show a masked key and its fingerprint.

use anyhow::Result;
use clap::Subcommand;
use fintrack_core::services::gateway::pool::DEFAULT_QUOTA_LIMIT;
use fintrack_core::Credential;
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::{format_timestamp, print_info, print_output, print_success};

#[derive(Subcommand)]
pub enum KeysAction {
    /// List all keys in the pool
    List,

    /// Add a key to the pool
    Add {
        /// The API key
        key: String,

        /// Informational per-period quota for this key
        #[arg(long, default_value_t = DEFAULT_QUOTA_LIMIT)]
        quota: u64,
    },

    /// Remove a key from the pool
    Remove {
        /// The API key
        key: String,
    },

    /// Clear a key's cooldown and error streak
    Reactivate {
        /// The API key
        key: String,
    },
}

/// Key row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct KeyRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Fingerprint")]
    pub fingerprint: String,
    #[tabled(rename = "Usage")]
    pub usage: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Errors")]
    pub error_count: u32,
    #[tabled(rename = "Eligibility")]
    pub eligibility: String,
    #[tabled(rename = "Disabled Until")]
    pub disabled_until: String,
    #[tabled(rename = "Last Used")]
    pub last_used: String,
}

impl KeyRow {
    fn from_credential(credential: &Credential, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            key: mask_key(&credential.identifier),
            fingerprint: credential.fingerprint(),
            usage: format!("{}/{}", credential.current_usage, credential.quota_limit),
            status: credential.status.to_string(),
            error_count: credential.error_count,
            eligibility: credential.eligibility(now).to_string(),
            disabled_until: format_timestamp(credential.disabled_until),
            last_used: format_timestamp(credential.last_used_at),
        }
    }
}

pub async fn execute(ctx: &Context, action: KeysAction) -> Result<()> {
    match action {
        KeysAction::List => list_keys(ctx).await,
        KeysAction::Add { key, quota } => add_key(ctx, key, quota).await,
        KeysAction::Remove { key } => remove_key(ctx, key).await,
        KeysAction::Reactivate { key } => reactivate_key(ctx, key).await,
    }
}

async fn list_keys(ctx: &Context) -> Result<()> {
    let now = ctx.gateway.clock().now();
    let rows: Vec<KeyRow> = ctx
        .gateway
        .pool()
        .list_credentials()
        .await?
        .iter()
        .map(|c| KeyRow::from_credential(c, now))
        .collect();

    if rows.is_empty() {
        print_info("No keys configured.", ctx.quiet);
        print_info("Use 'fintrack keys add <key>' to add one.", ctx.quiet);
        return Ok(());
    }

    print_output(&rows, ctx.format)
}

async fn add_key(ctx: &Context, key: String, quota: u64) -> Result<()> {
    let credential = ctx.gateway.pool().add_credential(&key, quota).await?;
    print_success(
        &format!(
            "Added key {} ({})",
            mask_key(&credential.identifier),
            credential.fingerprint()
        ),
        ctx.quiet,
    );
    Ok(())
}

async fn remove_key(ctx: &Context, key: String) -> Result<()> {
    let removed = ctx.gateway.pool().remove_credential(&key).await?;
    print_success(
        &format!("Removed key {} ({})", mask_key(&removed.identifier), removed.fingerprint()),
        ctx.quiet,
    );
    Ok(())
}

async fn reactivate_key(ctx: &Context, key: String) -> Result<()> {
    let credential = ctx.gateway.pool().reactivate_credential(&key).await?;
    print_success(
        &format!(
            "Reactivated key {} ({})",
            mask_key(&credential.identifier),
            credential.fingerprint()
        ),
        ctx.quiet,
    );
    Ok(())
}

/// Show only the ends of a key
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
