//! Usage commands
//!
//! Shows a user's counters as the next request would see them; rollover is
//! applied to the view only, nothing is written.

use anyhow::Result;
use clap::Subcommand;
use fintrack_core::services::gateway::FALLBACK_PLAN;
use fintrack_core::{PlanLimits, UsagePeriodState};
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::{format_limit, print_single};

#[derive(Subcommand)]
pub enum UsageAction {
    /// Show current usage against a plan's limits
    Show {
        /// User id
        user: String,

        /// Plan to compare against
        #[arg(long, default_value = FALLBACK_PLAN)]
        plan: String,
    },
}

/// Usage row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct UsageRow {
    #[tabled(rename = "User")]
    pub user: String,
    #[tabled(rename = "Plan")]
    pub plan: String,
    #[tabled(rename = "AI Month")]
    pub ai_month: String,
    #[tabled(rename = "AI Today")]
    pub ai_today: String,
    #[tabled(rename = "Voice Month")]
    pub voice_month: String,
    #[tabled(rename = "Month")]
    pub month: String,
    #[tabled(rename = "Day")]
    pub day: String,
}

impl UsageRow {
    fn new(user: &str, plan: &str, state: &UsagePeriodState, limits: &PlanLimits) -> Self {
        Self {
            user: user.to_string(),
            plan: plan.to_string(),
            ai_month: format!("{}/{}", state.ai_calls_this_month, format_limit(limits.ai_monthly)),
            ai_today: format!("{}/{}", state.ai_calls_today, format_limit(limits.ai_daily)),
            voice_month: format!(
                "{}/{}",
                state.voice_calls_this_month,
                format_limit(limits.voice_monthly)
            ),
            month: state.last_reset_month.clone().unwrap_or_else(|| "-".to_string()),
            day: state.last_reset_day.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub async fn execute(ctx: &Context, action: UsageAction) -> Result<()> {
    match action {
        UsageAction::Show { user, plan } => show_usage(ctx, user, plan).await,
    }
}

async fn show_usage(ctx: &Context, user: String, plan: String) -> Result<()> {
    let state = ctx.gateway.usage(&user).await?;
    let limits = ctx.gateway.plans().limits_for(&plan);
    print_single(&UsageRow::new(&user, &plan, &state, &limits), ctx.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_row() {
        let state = UsagePeriodState {
            ai_calls_this_month: 4,
            ai_calls_today: 1,
            voice_calls_this_month: 0,
            last_reset_month: Some("2026-07".to_string()),
            last_reset_day: None,
        };
        let row = UsageRow::new("anna", "free", &state, &PlanLimits::new(10, 3, 0));

        assert_eq!(row.ai_month, "4/10");
        assert_eq!(row.ai_today, "1/3");
        assert_eq!(row.voice_month, "0/disabled");
        assert_eq!(row.month, "2026-07");
        assert_eq!(row.day, "-");
    }
}
