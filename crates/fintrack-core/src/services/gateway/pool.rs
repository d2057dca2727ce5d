//! Credential pool manager
//!
//! Keeps the shared set of upstream API keys, hands out the least-used
//! eligible key and feeds call outcomes back into each key's circuit breaker.
//!
//! The pool document is re-read on every operation so operator edits to the
//! persisted pool are picked up without a restart. All read-modify-write
//! cycles run under one pool-wide lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::store::{self, keys, DocumentStore};
use super::types::{fingerprint, Credential};
use crate::error::{Error, Result};

/// Quota assigned to keys added without an explicit limit
pub const DEFAULT_QUOTA_LIMIT: u64 = 100_000;

/// Eligible credentials, best candidate first
///
/// Ascending `current_usage`, ties broken by ascending `last_used_at` with
/// never-used keys first. Equal keys keep their pool order.
pub fn rank_eligible(credentials: &[Credential], now: DateTime<Utc>) -> Vec<&Credential> {
    let mut eligible: Vec<&Credential> = credentials
        .iter()
        .filter(|c| c.is_eligible(now))
        .collect();
    eligible.sort_by_key(|c| (c.current_usage, c.last_used_at));
    eligible
}

/// Shared pool of upstream credentials
pub struct CredentialPool {
    store: Arc<dyn DocumentStore>,
    lock: Mutex<()>,
    failure_threshold: u32,
    cooldown: chrono::Duration,
}

impl CredentialPool {
    pub fn new(store: Arc<dyn DocumentStore>, failure_threshold: u32, cooldown: chrono::Duration) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    async fn load(&self) -> Result<Vec<Credential>> {
        Ok(store::load(self.store.as_ref(), keys::CREDENTIALS)
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, credentials: &[Credential]) -> Result<()> {
        store::save(self.store.as_ref(), keys::CREDENTIALS, credentials).await
    }

    /// Pick the credential for the next upstream call
    ///
    /// `Ok(None)` means nothing is eligible right now; the caller decides
    /// what that means. A key whose cooldown has elapsed is written back as
    /// `Active` when it is handed out.
    pub async fn select_credential(&self, now: DateTime<Utc>) -> Result<Option<Credential>> {
        let _guard = self.lock.lock().await;
        let mut credentials = self.load().await?;

        let chosen = match rank_eligible(&credentials, now).first() {
            Some(c) => c.identifier.clone(),
            None => {
                log::warn!(
                    "[gateway:pool] No eligible credential among {}",
                    credentials.len()
                );
                return Ok(None);
            }
        };

        let Some(credential) = credentials.iter_mut().find(|c| c.identifier == chosen) else {
            return Ok(None);
        };
        if credential.settle_cooldown(now) {
            log::info!(
                "[gateway:pool] Credential {} back from cooldown",
                credential.fingerprint()
            );
            let selected = credential.clone();
            self.save(&credentials).await?;
            return Ok(Some(selected));
        }

        log::debug!(
            "[gateway:pool] Selected credential {} (usage {})",
            credential.fingerprint(),
            credential.current_usage
        );
        Ok(Some(credential.clone()))
    }

    /// Feed the result of an upstream call back into the credential's state
    ///
    /// Unknown identifiers are ignored: the key was removed while in flight.
    pub async fn record_outcome(&self, identifier: &str, success: bool, now: DateTime<Utc>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut credentials = self.load().await?;

        let Some(credential) = credentials.iter_mut().find(|c| c.identifier == identifier) else {
            log::debug!(
                "[gateway:pool] Outcome for unknown credential {} dropped",
                fingerprint(identifier)
            );
            return Ok(());
        };

        if success {
            credential.record_success(now);
        } else if credential.record_failure(now, self.failure_threshold, self.cooldown) {
            log::warn!(
                "[gateway:pool] Credential {} disabled until {} after {} consecutive failures",
                credential.fingerprint(),
                now + self.cooldown,
                credential.error_count
            );
        } else {
            log::debug!(
                "[gateway:pool] Credential {} failed ({} in a row)",
                credential.fingerprint(),
                credential.error_count
            );
        }

        self.save(&credentials).await
    }

    // ------------------------------------------------------------------------
    // Administrative operations
    // ------------------------------------------------------------------------

    /// All credentials in pool order
    pub async fn list_credentials(&self) -> Result<Vec<Credential>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Add a new active credential; duplicates are rejected
    ///
    /// Identifiers are trimmed here and in every other admin lookup.
    pub async fn add_credential(&self, identifier: &str, quota_limit: u64) -> Result<Credential> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::validation("Credential key must not be empty"));
        }

        let _guard = self.lock.lock().await;
        let mut credentials = self.load().await?;
        if credentials.iter().any(|c| c.identifier == identifier) {
            return Err(Error::validation("Key exists"));
        }

        let credential = Credential::new(identifier, quota_limit);
        credentials.push(credential.clone());
        self.save(&credentials).await?;

        log::info!("[gateway:pool] Added credential {}", credential.fingerprint());
        Ok(credential)
    }

    /// Remove a credential
    pub async fn remove_credential(&self, identifier: &str) -> Result<Credential> {
        let identifier = identifier.trim();
        let _guard = self.lock.lock().await;
        let mut credentials = self.load().await?;
        let index = credentials
            .iter()
            .position(|c| c.identifier == identifier)
            .ok_or_else(|| Error::not_found(format!("credential {}", fingerprint(identifier))))?;

        let removed = credentials.remove(index);
        self.save(&credentials).await?;

        log::info!("[gateway:pool] Removed credential {}", removed.fingerprint());
        Ok(removed)
    }

    /// Operator reset of status, cooldown and error streak
    pub async fn reactivate_credential(&self, identifier: &str) -> Result<Credential> {
        let identifier = identifier.trim();
        let _guard = self.lock.lock().await;
        let mut credentials = self.load().await?;
        let credential = credentials
            .iter_mut()
            .find(|c| c.identifier == identifier)
            .ok_or_else(|| Error::not_found(format!("credential {}", fingerprint(identifier))))?;

        credential.reactivate();
        let reactivated = credential.clone();
        self.save(&credentials).await?;

        log::info!("[gateway:pool] Reactivated credential {}", reactivated.fingerprint());
        Ok(reactivated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::store::MemoryStore;
    use crate::services::gateway::types::{CredentialStatus, Eligibility};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
    }

    fn pool() -> CredentialPool {
        CredentialPool::new(Arc::new(MemoryStore::new()), 3, chrono::Duration::minutes(5))
    }

    async fn seed(pool: &CredentialPool, credentials: &[Credential]) {
        pool.save(credentials).await.unwrap();
    }

    #[test]
    fn test_rank_prefers_never_used_at_equal_usage() {
        let mut a = Credential::new("A", 100);
        a.current_usage = 2;
        a.last_used_at = Some(t0());
        let b = Credential::new("B", 100);
        let mut c = Credential::new("C", 100);
        c.last_used_at = Some(t0() - chrono::Duration::hours(1));

        let pool = vec![a, b, c];
        let order: Vec<&str> = rank_eligible(&pool, t0())
            .iter()
            .map(|c| c.identifier.as_str())
            .collect();
        assert_eq!(order, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_rank_skips_ineligible() {
        let mut cooling = Credential::new("cooling", 100);
        cooling.disabled_until = Some(t0() + chrono::Duration::minutes(1));
        let mut off = Credential::new("off", 100);
        off.status = CredentialStatus::Disabled;
        let mut busy = Credential::new("busy", 100);
        busy.current_usage = 50;

        let pool = vec![cooling, off, busy];
        let order: Vec<&str> = rank_eligible(&pool, t0())
            .iter()
            .map(|c| c.identifier.as_str())
            .collect();
        assert_eq!(order, vec!["busy"]);
    }

    #[tokio::test]
    async fn test_select_empty_pool() {
        assert!(pool().select_credential(t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_select_and_success_feedback() {
        let pool = pool();
        seed(&pool, &[Credential::new("A", 100), Credential::new("B", 100)]).await;

        let first = pool.select_credential(t0()).await.unwrap().unwrap();
        assert_eq!(first.identifier, "A");
        pool.record_outcome("A", true, t0()).await.unwrap();

        // A now has usage 1, B is picked next
        let second = pool.select_credential(t0()).await.unwrap().unwrap();
        assert_eq!(second.identifier, "B");

        let stored = pool.list_credentials().await.unwrap();
        assert_eq!(stored[0].current_usage, 1);
        assert_eq!(stored[0].last_used_at, Some(t0()));
    }

    #[tokio::test]
    async fn test_circuit_breaker_cooldown_window() {
        let pool = pool();
        seed(&pool, &[Credential::new("A", 100)]).await;

        let trip = t0();
        for _ in 0..3 {
            pool.record_outcome("A", false, trip).await.unwrap();
        }

        let stored = pool.list_credentials().await.unwrap();
        assert_eq!(stored[0].status, CredentialStatus::Disabled);
        assert_eq!(stored[0].eligibility(trip), Eligibility::CoolingDown);

        let almost = trip + chrono::Duration::minutes(5) - chrono::Duration::seconds(1);
        assert!(pool.select_credential(almost).await.unwrap().is_none());

        let back = trip + chrono::Duration::minutes(5);
        let selected = pool.select_credential(back).await.unwrap().unwrap();
        assert_eq!(selected.identifier, "A");
        assert_eq!(selected.status, CredentialStatus::Active);

        let stored = pool.list_credentials().await.unwrap();
        assert_eq!(stored[0].status, CredentialStatus::Active);
        assert_eq!(stored[0].disabled_until, None);
    }

    #[tokio::test]
    async fn test_failure_after_cooldown_retrips_immediately() {
        let pool = pool();
        seed(&pool, &[Credential::new("A", 100)]).await;
        for _ in 0..3 {
            pool.record_outcome("A", false, t0()).await.unwrap();
        }
        let later = t0() + chrono::Duration::minutes(6);
        pool.select_credential(later).await.unwrap().unwrap();
        pool.record_outcome("A", false, later).await.unwrap();
        assert!(pool.select_credential(later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_two_failures_then_success_keeps_key_active() {
        let pool = pool();
        seed(&pool, &[Credential::new("A", 100)]).await;
        pool.record_outcome("A", false, t0()).await.unwrap();
        pool.record_outcome("A", false, t0()).await.unwrap();
        pool.record_outcome("A", true, t0()).await.unwrap();
        pool.record_outcome("A", false, t0()).await.unwrap();

        let stored = pool.list_credentials().await.unwrap();
        assert_eq!(stored[0].error_count, 1);
        assert_eq!(stored[0].status, CredentialStatus::Active);
    }

    #[tokio::test]
    async fn test_outcome_for_removed_credential_is_noop() {
        let pool = pool();
        seed(&pool, &[Credential::new("A", 100)]).await;
        pool.record_outcome("gone", false, t0()).await.unwrap();
        assert_eq!(pool.list_credentials().await.unwrap(), vec![Credential::new("A", 100)]);
    }

    #[tokio::test]
    async fn test_concurrent_outcomes_are_not_lost() {
        let pool = Arc::new(pool());
        seed(&pool, &[Credential::new("A", 100)]).await;

        let mut handles = Vec::new();
        for _ in 0..40 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.record_outcome("A", true, t0()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(pool.list_credentials().await.unwrap()[0].current_usage, 40);
    }

    #[tokio::test]
    async fn test_admin_operations() {
        let pool = pool();
        pool.add_credential("A", DEFAULT_QUOTA_LIMIT).await.unwrap();
        assert!(matches!(
            pool.add_credential("A", 5).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(pool.add_credential("  ", 5).await, Err(Error::Validation(_))));

        for _ in 0..3 {
            pool.record_outcome("A", false, t0()).await.unwrap();
        }
        let reactivated = pool.reactivate_credential("A").await.unwrap();
        assert!(reactivated.is_eligible(t0()));
        assert_eq!(reactivated.error_count, 0);

        assert!(matches!(
            pool.reactivate_credential("B").await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(pool.remove_credential("A").await.unwrap().identifier, "A");
        assert!(matches!(pool.remove_credential("A").await, Err(Error::NotFound(_))));
        assert!(pool.list_credentials().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_lookups_trim_like_add() {
        let pool = pool();
        let added = pool.add_credential(" k-1 ", 10).await.unwrap();
        assert_eq!(added.identifier, "k-1");
        assert!(matches!(
            pool.add_credential("k-1\n", 10).await,
            Err(Error::Validation(_))
        ));

        assert_eq!(pool.reactivate_credential(" k-1 ").await.unwrap().identifier, "k-1");
        assert_eq!(pool.remove_credential(" k-1 ").await.unwrap().identifier, "k-1");
        assert!(pool.list_credentials().await.unwrap().is_empty());
    }
}
