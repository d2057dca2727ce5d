//! Plan commands
//!
//! Commands for inspecting the subscription plan catalog.

use anyhow::Result;
use clap::Subcommand;
use fintrack_core::PlanLimits;
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::{format_limit, print_output};

#[derive(Subcommand)]
pub enum PlansAction {
    /// List all plans and their limits
    List,
}

/// Plan row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct PlanRow {
    #[tabled(rename = "Plan")]
    pub plan: String,
    #[tabled(rename = "AI / Month")]
    pub ai_monthly: String,
    #[tabled(rename = "AI / Day")]
    pub ai_daily: String,
    #[tabled(rename = "Voice / Month")]
    pub voice_monthly: String,
}

impl PlanRow {
    fn new(plan: &str, limits: &PlanLimits) -> Self {
        Self {
            plan: plan.to_string(),
            ai_monthly: format_limit(limits.ai_monthly),
            ai_daily: format_limit(limits.ai_daily),
            voice_monthly: format_limit(limits.voice_monthly),
        }
    }
}

pub async fn execute(ctx: &Context, action: PlansAction) -> Result<()> {
    match action {
        PlansAction::List => list_plans(ctx).await,
    }
}

async fn list_plans(ctx: &Context) -> Result<()> {
    let rows: Vec<PlanRow> = ctx
        .gateway
        .plans()
        .iter()
        .map(|(name, limits)| PlanRow::new(name, limits))
        .collect();

    print_output(&rows, ctx.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_row_labels() {
        let row = PlanRow::new("enterprise", &PlanLimits::unlimited());
        assert_eq!(row.ai_monthly, "unlimited");

        let row = PlanRow::new("free", &PlanLimits::new(20, 5, 0));
        assert_eq!(row.ai_daily, "5");
        assert_eq!(row.voice_monthly, "disabled");
    }
}
