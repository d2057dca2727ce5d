//! AI request commands
//!
//! Sends a budget-plan or voice request through the access gateway, so the
//! same quota, key rotation and audit rules apply as for app traffic.

use anyhow::{Context as _, Result};
use clap::Subcommand;
use fintrack_core::services::gateway::FALLBACK_PLAN;
use fintrack_core::{GatewayError, PlanRequest, ServedPlan, VoiceRequest};
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::{print_error, print_single};

#[derive(Subcommand)]
pub enum AiAction {
    /// Generate a monthly budget plan
    Plan {
        /// User id the request is charged to
        #[arg(long)]
        user: String,

        /// The user's subscription plan
        #[arg(long, default_value = FALLBACK_PLAN)]
        plan: String,

        /// Monthly income
        #[arg(long)]
        income: f64,

        /// Savings goal (repeatable)
        #[arg(long = "goal")]
        goals: Vec<String>,
    },

    /// Transcribe a voice note
    Voice {
        /// User id the request is charged to
        #[arg(long)]
        user: String,

        /// The user's subscription plan
        #[arg(long, default_value = FALLBACK_PLAN)]
        plan: String,

        /// Base64-encoded audio
        #[arg(long, conflicts_with = "audio_file", required_unless_present = "audio_file")]
        audio: Option<String>,

        /// File containing base64-encoded audio
        #[arg(long)]
        audio_file: Option<String>,
    },
}

/// Budget plan row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct BudgetRow {
    #[tabled(rename = "Savings")]
    pub savings: f64,
    #[tabled(rename = "Food")]
    pub food: f64,
    #[tabled(rename = "Transport")]
    pub transport: f64,
    #[tabled(rename = "Others")]
    pub others: f64,
    #[tabled(rename = "Goals")]
    pub goals: String,
    #[tabled(rename = "Key")]
    pub key: String,
}

impl From<ServedPlan> for BudgetRow {
    fn from(served: ServedPlan) -> Self {
        Self {
            savings: served.plan.savings,
            food: served.plan.food,
            transport: served.plan.transport,
            others: served.plan.others,
            goals: served.plan.goals.join(", "),
            key: served.credential.unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Transcription row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct TranscriptRow {
    #[tabled(rename = "User")]
    pub user: String,
    #[tabled(rename = "Text")]
    pub text: String,
}

pub async fn execute(ctx: &Context, action: AiAction) -> Result<()> {
    match action {
        AiAction::Plan {
            user,
            plan,
            income,
            goals,
        } => request_plan(ctx, user, plan, income, goals).await,
        AiAction::Voice {
            user,
            plan,
            audio,
            audio_file,
        } => request_voice(ctx, user, plan, audio, audio_file).await,
    }
}

async fn request_plan(
    ctx: &Context,
    user: String,
    plan: String,
    income: f64,
    goals: Vec<String>,
) -> Result<()> {
    let request = PlanRequest { income, goals };
    match ctx.gateway.request_ai_plan(&user, &plan, request).await {
        Ok(served) => print_single(&BudgetRow::from(served), ctx.format),
        Err(e) => Err(denied(e)),
    }
}

async fn request_voice(
    ctx: &Context,
    user: String,
    plan: String,
    audio: Option<String>,
    audio_file: Option<String>,
) -> Result<()> {
    let audio_base64 = match (audio, audio_file) {
        (Some(audio), _) => audio,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read audio file {}", path))?,
        (None, None) => anyhow::bail!("Either --audio or --audio-file is required"),
    };

    let request = VoiceRequest { audio_base64 };
    match ctx.gateway.request_voice_transcription(&user, &plan, request).await {
        Ok(text) => print_single(&TranscriptRow { user, text }, ctx.format),
        Err(e) => Err(denied(e)),
    }
}

/// Show the end-user guidance, then fail with the typed error
fn denied(e: GatewayError) -> anyhow::Error {
    print_error(&e.user_message());
    let status = e.status_code();
    anyhow::Error::new(e).context(format!("Request refused (status {})", status))
}
