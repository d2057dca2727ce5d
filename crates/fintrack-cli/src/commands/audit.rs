//! Audit commands
//!
//! Read-only views over the append-only call and reset logs.

use anyhow::Result;
use clap::Subcommand;
use fintrack_core::services::gateway::{AuditSummary, ResetLogEntry};
use fintrack_core::CallLogEntry;
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::{format_timestamp, print_output, print_single};

#[derive(Subcommand)]
pub enum AuditAction {
    /// List recent gateway calls
    List {
        /// Only calls by this user
        #[arg(long)]
        user: Option<String>,

        /// Number of most recent entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// List counter resets
    Resets {
        /// Only resets of this user
        #[arg(long)]
        user: Option<String>,

        /// Number of most recent entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Totals over the whole call log
    Summary,
}

/// Call row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct CallRow {
    #[tabled(rename = "Time")]
    pub ts: String,
    #[tabled(rename = "User")]
    pub user: String,
    #[tabled(rename = "Type")]
    pub call_type: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Error")]
    pub error: String,
}

impl From<CallLogEntry> for CallRow {
    fn from(entry: CallLogEntry) -> Self {
        Self {
            ts: format_timestamp(Some(entry.ts)),
            user: entry.user_id,
            call_type: entry.call_type.to_string(),
            status: entry.status.to_string(),
            key: entry.credential.unwrap_or_else(|| "-".to_string()),
            error: entry.error.unwrap_or_default(),
        }
    }
}

/// Reset row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct ResetRow {
    #[tabled(rename = "Time")]
    pub ts: String,
    #[tabled(rename = "User")]
    pub user: String,
    #[tabled(rename = "Counter")]
    pub kind: String,
}

impl From<ResetLogEntry> for ResetRow {
    fn from(entry: ResetLogEntry) -> Self {
        Self {
            ts: format_timestamp(Some(entry.ts)),
            user: entry.user_id,
            kind: entry.kind.to_string(),
        }
    }
}

/// Summary row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "AI Calls")]
    pub ai_calls_total: usize,
    #[tabled(rename = "AI Ok")]
    pub ai_calls_ok: usize,
    #[tabled(rename = "AI Errors")]
    pub ai_calls_error: usize,
    #[tabled(rename = "Voice Calls")]
    pub voice_calls_total: usize,
    #[tabled(rename = "Users")]
    pub distinct_users: usize,
}

impl From<AuditSummary> for SummaryRow {
    fn from(summary: AuditSummary) -> Self {
        Self {
            ai_calls_total: summary.ai_calls_total,
            ai_calls_ok: summary.ai_calls_ok,
            ai_calls_error: summary.ai_calls_error,
            voice_calls_total: summary.voice_calls_total,
            distinct_users: summary.distinct_users,
        }
    }
}

pub async fn execute(ctx: &Context, action: AuditAction) -> Result<()> {
    match action {
        AuditAction::List { user, limit } => list_calls(ctx, user, limit).await,
        AuditAction::Resets { user, limit } => list_resets(ctx, user, limit).await,
        AuditAction::Summary => show_summary(ctx).await,
    }
}

async fn list_calls(ctx: &Context, user: Option<String>, limit: usize) -> Result<()> {
    let entries = ctx.gateway.call_log().entries().await?;
    let rows: Vec<CallRow> = most_recent(entries, limit, |e| matches_user(&user, &e.user_id))
        .into_iter()
        .map(CallRow::from)
        .collect();
    print_output(&rows, ctx.format)
}

async fn list_resets(ctx: &Context, user: Option<String>, limit: usize) -> Result<()> {
    let entries = ctx.gateway.ledger().reset_log().entries().await?;
    let rows: Vec<ResetRow> = most_recent(entries, limit, |e| matches_user(&user, &e.user_id))
        .into_iter()
        .map(ResetRow::from)
        .collect();
    print_output(&rows, ctx.format)
}

async fn show_summary(ctx: &Context) -> Result<()> {
    let summary = ctx.gateway.audit_summary().await?;
    print_single(&SummaryRow::from(summary), ctx.format)
}

fn matches_user(filter: &Option<String>, user_id: &str) -> bool {
    filter.as_deref().map_or(true, |u| u == user_id)
}

/// Last `limit` entries passing `keep`, oldest first
fn most_recent<T>(entries: Vec<T>, limit: usize, keep: impl Fn(&T) -> bool) -> Vec<T> {
    let mut kept: Vec<T> = entries.into_iter().filter(|e| keep(e)).collect();
    let skip = kept.len().saturating_sub(limit);
    kept.drain(..skip);
    kept
}
