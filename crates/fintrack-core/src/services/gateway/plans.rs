//! Plan limit resolver
//!
//! Maps a subscription plan identifier to its quota configuration. Unknown
//! plans fall back to `free`; a catalog without `free` grants nothing.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::types::PlanLimits;
use crate::error::Result;

/// Plan every unknown identifier falls back to
pub const FALLBACK_PLAN: &str = "free";

/// Mapping of plan identifier to limits (`account_types.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanCatalog {
    plans: BTreeMap<String, PlanLimits>,
}

impl PlanCatalog {
    pub fn new(plans: impl IntoIterator<Item = (String, PlanLimits)>) -> Self {
        Self {
            plans: plans.into_iter().collect(),
        }
    }

    /// Catalog used when no plan file is configured
    pub fn builtin() -> Self {
        Self::new([
            ("free".to_string(), PlanLimits::new(20, 5, 0)),
            ("pro_basic".to_string(), PlanLimits::new(200, 20, 0)),
            ("pro_plus".to_string(), PlanLimits::new(1000, 100, 100)),
            ("enterprise".to_string(), PlanLimits::unlimited()),
        ])
    }

    /// Load a catalog from a JSON file, the built-in catalog if it is missing
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let catalog: Self = serde_json::from_str(&raw)?;
                log::info!(
                    "[gateway:plans] Loaded {} plans from {}",
                    catalog.plans.len(),
                    path.display()
                );
                Ok(catalog)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "[gateway:plans] No plan file at {}, using built-in plans",
                    path.display()
                );
                Ok(Self::builtin())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Limits for `plan`
    ///
    /// Never fails: absence degrades to `free`, then to all-disabled.
    pub fn limits_for(&self, plan: &str) -> PlanLimits {
        if let Some(limits) = self.plans.get(plan) {
            return *limits;
        }
        match self.plans.get(FALLBACK_PLAN) {
            Some(limits) => {
                log::debug!("[gateway:plans] Unknown plan {:?}, using {}", plan, FALLBACK_PLAN);
                *limits
            }
            None => {
                log::warn!(
                    "[gateway:plans] Unknown plan {:?} and no {} plan, all capabilities disabled",
                    plan,
                    FALLBACK_PLAN
                );
                PlanLimits::disabled()
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlanLimits)> {
        self.plans.iter().map(|(name, limits)| (name.as_str(), limits))
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
