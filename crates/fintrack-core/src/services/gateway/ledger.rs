//! Usage ledger
//!
//! Per-user AI and voice counters with daily/monthly rollover. A user's
//! ledger is only touched while holding that user's lock; different users
//! never contend.
//!
//! Ordering contract for every admission check:
//!
//! ```text
//! lock_user -> load -> reset_month_if_needed -> reset_day_if_needed -> check_*
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::audit::ResetLog;
use super::store::{self, keys, DocumentStore};
use super::types::{
    Capability, DenialReason, PlanLimits, QuotaDimension, ResetKind, ResetLogEntry,
    UsagePeriodState,
};
use crate::error::Result;

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Exclusive access to one user's ledger
///
/// Owned so it can travel into a spawned task. Dropping the last guard for a
/// user removes that user's entry from the lock table.
pub struct UserGuard {
    user_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // waiters hold a clone of the Arc, so a count of 1 means nobody else
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

// ============================================================================
// Quota Checks
// ============================================================================

/// `true` when a limit is enforced and `used` has reached it
fn exhausted(used: u64, limit: i64) -> bool {
    limit >= 0 && used >= limit as u64
}

/// Admission check for the AI capability; monthly is checked before daily
pub fn check_ai_quota(state: &UsagePeriodState, limits: &PlanLimits) -> Option<DenialReason> {
    if exhausted(state.ai_calls_this_month, limits.ai_monthly) {
        return Some(DenialReason::QuotaExceeded {
            capability: Capability::Ai,
            dimension: QuotaDimension::Monthly,
        });
    }
    if exhausted(state.ai_calls_today, limits.ai_daily) {
        return Some(DenialReason::QuotaExceeded {
            capability: Capability::Ai,
            dimension: QuotaDimension::Daily,
        });
    }
    None
}

/// Admission check for the voice capability
pub fn check_voice_quota(state: &UsagePeriodState, limits: &PlanLimits) -> Option<DenialReason> {
    if limits.voice_monthly == 0 {
        return Some(DenialReason::CapabilityDisabled {
            capability: Capability::Voice,
        });
    }
    if exhausted(state.voice_calls_this_month, limits.voice_monthly) {
        return Some(DenialReason::QuotaExceeded {
            capability: Capability::Voice,
            dimension: QuotaDimension::Monthly,
        });
    }
    None
}

// ============================================================================
// UsageLedger
// ============================================================================

/// Persistent per-user usage counters
pub struct UsageLedger {
    store: Arc<dyn DocumentStore>,
    resets: ResetLog,
    locks: Arc<LockMap>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            resets: ResetLog::new(Arc::clone(&store), keys::RESET_LOG),
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The append-only reset log
    pub fn reset_log(&self) -> &ResetLog {
        &self.resets
    }

    /// Wait for exclusive access to `user_id`'s ledger
    pub async fn lock_user(&self, user_id: &str) -> UserGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                locks
                    .entry(user_id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        UserGuard {
            user_id: user_id.to_string(),
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Users with a held or awaited lock
    pub fn locked_users(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Load a user's counters, creating an empty ledger on first use
    pub async fn load(&self, user_id: &str) -> Result<UsagePeriodState> {
        let state = store::load(self.store.as_ref(), &keys::ledger(user_id)).await?;
        Ok(state.unwrap_or_default())
    }

    pub async fn save(&self, user_id: &str, state: &UsagePeriodState) -> Result<()> {
        store::save(self.store.as_ref(), &keys::ledger(user_id), state).await
    }

    /// Zero monthly counters on a new month and log `ai_month` + `voice_month`
    ///
    /// Returns `true` if a rollover happened.
    pub async fn reset_month_if_needed(
        &self,
        state: &mut UsagePeriodState,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !state.roll_month(now) {
            return Ok(false);
        }
        log::info!("[gateway:ledger] Monthly counters reset for {}", user_id);
        self.resets
            .append_all(vec![
                ResetLogEntry {
                    user_id: user_id.to_string(),
                    kind: ResetKind::AiMonth,
                    ts: now,
                },
                ResetLogEntry {
                    user_id: user_id.to_string(),
                    kind: ResetKind::VoiceMonth,
                    ts: now,
                },
            ])
            .await?;
        Ok(true)
    }

    /// Zero the daily counter on a new day and log `ai_day`
    pub async fn reset_day_if_needed(
        &self,
        state: &mut UsagePeriodState,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !state.roll_day(now) {
            return Ok(false);
        }
        log::debug!("[gateway:ledger] Daily counter reset for {}", user_id);
        self.resets
            .append(ResetLogEntry {
                user_id: user_id.to_string(),
                kind: ResetKind::AiDay,
                ts: now,
            })
            .await?;
        Ok(true)
    }

    /// Month reset, then day reset
    pub async fn roll_periods(
        &self,
        state: &mut UsagePeriodState,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.reset_month_if_needed(state, user_id, now).await?;
        self.reset_day_if_needed(state, user_id, now).await?;
        Ok(())
    }

    /// Current counters as a check at `now` would see them
    ///
    /// Rollover is applied to the returned copy only; nothing is written.
    pub async fn snapshot(&self, user_id: &str, now: DateTime<Utc>) -> Result<UsagePeriodState> {
        let _guard = self.lock_user(user_id).await;
        let mut state = self.load(user_id).await?;
        state.roll_month(now);
        state.roll_day(now);
        Ok(state)
    }
}

// ============================================================================
// Tests
// ============================================================================
