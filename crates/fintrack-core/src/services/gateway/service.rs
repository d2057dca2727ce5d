//! Access gateway
//!
//! Orchestrates one AI or voice request end to end:
//!
//! ```text
//! lock user -> load ledger -> roll month/day -> resolve plan -> check quota
//!     -> select credential -> invoke upstream (bounded) -> record outcome
//!     -> record usage -> persist ledger -> audit
//! ```
//!
//! Each request runs on its own task. Dropping the caller's future does not
//! abort that task, so a call that reached the upstream always has its
//! outcome applied to the credential pool, the ledger and the audit log.

use std::sync::Arc;
use std::time::Duration;

use super::audit::{AuditSummary, CallLog};
use super::backends::{BudgetPlanner, StubTranscriber};
use super::clock::{Clock, SystemClock};
use super::ledger::{check_ai_quota, check_voice_quota, UsageLedger};
use super::plans::PlanCatalog;
use super::pool::CredentialPool;
use super::provider::{AiBackend, BackendError, GatewayError, VoiceBackend};
use super::store::{self, keys, DocumentStore};
use super::types::{
    CallLogEntry, CallType, PlanRequest, ServedPlan, UsagePeriodState, VoiceRequest,
};
use crate::config::{
    GatewayConfig, DEFAULT_COOLDOWN_SECS, DEFAULT_FAILURE_THRESHOLD, DEFAULT_UPSTREAM_TIMEOUT_SECS,
};

// ============================================================================
// Builder
// ============================================================================

/// Assembles an `AccessGateway` from its collaborators
pub struct GatewayBuilder {
    store: Arc<dyn DocumentStore>,
    plans: PlanCatalog,
    clock: Arc<dyn Clock>,
    ai: Arc<dyn AiBackend>,
    voice: Arc<dyn VoiceBackend>,
    upstream_timeout: Duration,
    failure_threshold: u32,
    cooldown: chrono::Duration,
}

impl GatewayBuilder {
    fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            plans: PlanCatalog::builtin(),
            clock: Arc::new(SystemClock),
            ai: Arc::new(BudgetPlanner),
            voice: Arc::new(StubTranscriber::default()),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: chrono::Duration::seconds(DEFAULT_COOLDOWN_SECS as i64),
        }
    }

    /// Take timeout and circuit breaker settings from a configuration
    pub fn with_config(mut self, config: &GatewayConfig) -> Self {
        self.upstream_timeout = config.upstream_timeout();
        self.failure_threshold = config.failure_threshold;
        self.cooldown = config.cooldown();
        self
    }

    pub fn with_plans(mut self, plans: PlanCatalog) -> Self {
        self.plans = plans;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ai_backend(mut self, ai: Arc<dyn AiBackend>) -> Self {
        self.ai = ai;
        self
    }

    pub fn with_voice_backend(mut self, voice: Arc<dyn VoiceBackend>) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn build(self) -> AccessGateway {
        AccessGateway {
            inner: Arc::new(GatewayInner {
                ledger: UsageLedger::new(Arc::clone(&self.store)),
                pool: CredentialPool::new(
                    Arc::clone(&self.store),
                    self.failure_threshold,
                    self.cooldown,
                ),
                calls: CallLog::new(Arc::clone(&self.store), keys::AI_CALL_LOG),
                store: self.store,
                plans: self.plans,
                clock: self.clock,
                ai: self.ai,
                voice: self.voice,
                upstream_timeout: self.upstream_timeout,
            }),
        }
    }
}

// ============================================================================
// AccessGateway
// ============================================================================

/// Process-wide entry point for rate-limited AI capabilities
///
/// Construct once at startup and clone freely; clones share all state.
#[derive(Clone)]
pub struct AccessGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    store: Arc<dyn DocumentStore>,
    ledger: UsageLedger,
    pool: CredentialPool,
    calls: CallLog,
    plans: PlanCatalog,
    clock: Arc<dyn Clock>,
    ai: Arc<dyn AiBackend>,
    voice: Arc<dyn VoiceBackend>,
    upstream_timeout: Duration,
}

impl AccessGateway {
    pub fn builder(store: Arc<dyn DocumentStore>) -> GatewayBuilder {
        GatewayBuilder::new(store)
    }

    /// Open the configured store and plan catalog with the built-in backends
    pub async fn open(config: &GatewayConfig) -> crate::error::Result<Self> {
        let store = store::open_store(config).await?;
        let plans = PlanCatalog::load_or_builtin(&config.plans_path)?;
        Ok(Self::builder(store)
            .with_config(config)
            .with_plans(plans)
            .build())
    }

    /// Generate a budget plan for `user_id` on `plan`
    pub async fn request_ai_plan(
        &self,
        user_id: &str,
        plan: &str,
        request: PlanRequest,
    ) -> Result<ServedPlan, GatewayError> {
        let inner = Arc::clone(&self.inner);
        let user_id = user_id.to_string();
        let plan = plan.to_string();
        let task =
            tokio::spawn(async move { inner.run_ai_plan(&user_id, &plan, request).await });

        task.await.unwrap_or_else(|e| {
            log::error!("[gateway] AI plan task failed: {}", e);
            Err(GatewayError::Internal(e.to_string()))
        })
    }

    /// Transcribe a voice note for `user_id` on `plan`
    pub async fn request_voice_transcription(
        &self,
        user_id: &str,
        plan: &str,
        request: VoiceRequest,
    ) -> Result<String, GatewayError> {
        let inner = Arc::clone(&self.inner);
        let user_id = user_id.to_string();
        let plan = plan.to_string();
        let task = tokio::spawn(async move { inner.run_voice(&user_id, &plan, request).await });

        task.await.unwrap_or_else(|e| {
            log::error!("[gateway] Voice task failed: {}", e);
            Err(GatewayError::Internal(e.to_string()))
        })
    }

    /// A user's counters as the next admission check would see them
    pub async fn usage(&self, user_id: &str) -> Result<UsagePeriodState, GatewayError> {
        let now = self.inner.clock.now();
        Ok(self.inner.ledger.snapshot(user_id, now).await?)
    }

    /// Totals over the call log
    pub async fn audit_summary(&self) -> Result<AuditSummary, GatewayError> {
        let entries = self.inner.calls.entries().await?;
        Ok(AuditSummary::from_entries(&entries))
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.inner.pool
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.inner.ledger
    }

    pub fn call_log(&self) -> &CallLog {
        &self.inner.calls
    }

    pub fn plans(&self) -> &PlanCatalog {
        &self.inner.plans
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }
}

impl GatewayInner {
    async fn run_ai_plan(
        &self,
        user_id: &str,
        plan: &str,
        request: PlanRequest,
    ) -> Result<ServedPlan, GatewayError> {
        let _guard = self.ledger.lock_user(user_id).await;
        let now = self.clock.now();

        let mut state = self.ledger.load(user_id).await?;
        let before = state.clone();
        self.ledger.roll_periods(&mut state, user_id, now).await?;

        let limits = self.plans.limits_for(plan);
        if let Some(reason) = check_ai_quota(&state, &limits) {
            log::warn!("[gateway] {} denied ({}): {}", user_id, plan, reason);
            self.save_if_changed(user_id, &before, &state).await?;
            return Err(reason.into());
        }

        let credential = self.pool.select_credential(now).await?;
        let key = credential.as_ref().map(|c| c.identifier.clone());
        let key_fp = credential.as_ref().map(|c| c.fingerprint());

        let result = match tokio::time::timeout(
            self.upstream_timeout,
            self.ai.invoke(key.as_deref(), &request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.upstream_timeout.as_secs())),
        };
        let done = self.clock.now();

        match result {
            Ok(output) => {
                let mut failure = None;
                state.record_ai_call();
                settle(&mut failure, "usage", self.ledger.save(user_id, &state).await);
                settle(
                    &mut failure,
                    "call log entry",
                    self.calls
                        .append(
                            CallLogEntry::ok(user_id, CallType::GeneratePlan, done)
                                .with_credential(key_fp.clone()),
                        )
                        .await,
                );
                if let Some(key) = &key {
                    settle(
                        &mut failure,
                        "credential outcome",
                        self.pool.record_outcome(key, true, done).await,
                    );
                }
                if let Some(e) = failure {
                    return Err(e);
                }

                log::info!(
                    "[gateway] Plan served for {} via {} ({} this month, {} today)",
                    user_id,
                    key_fp.as_deref().unwrap_or("-"),
                    state.ai_calls_this_month,
                    state.ai_calls_today
                );
                Ok(ServedPlan {
                    plan: output,
                    credential: key_fp,
                })
            }
            Err(e) => {
                let mut failure = None;
                settle(
                    &mut failure,
                    "usage",
                    self.save_if_changed(user_id, &before, &state).await,
                );
                settle(
                    &mut failure,
                    "call log entry",
                    self.calls
                        .append(
                            CallLogEntry::error(user_id, CallType::GeneratePlan, done, e.to_string())
                                .with_credential(key_fp.clone()),
                        )
                        .await,
                );
                if let Some(key) = &key {
                    settle(
                        &mut failure,
                        "credential outcome",
                        self.pool.record_outcome(key, false, done).await,
                    );
                }
                if let Some(failure) = failure {
                    return Err(failure);
                }

                log::warn!(
                    "[gateway] Upstream {} failed for {} via {}: {}",
                    self.ai.backend_id(),
                    user_id,
                    key_fp.as_deref().unwrap_or("-"),
                    e
                );
                Err(GatewayError::UpstreamUnavailable)
            }
        }
    }

    async fn run_voice(
        &self,
        user_id: &str,
        plan: &str,
        request: VoiceRequest,
    ) -> Result<String, GatewayError> {
        let _guard = self.ledger.lock_user(user_id).await;
        let now = self.clock.now();

        let mut state = self.ledger.load(user_id).await?;
        let before = state.clone();
        self.ledger.roll_periods(&mut state, user_id, now).await?;

        let limits = self.plans.limits_for(plan);
        if let Some(reason) = check_voice_quota(&state, &limits) {
            log::warn!("[gateway] {} voice denied ({}): {}", user_id, plan, reason);
            self.save_if_changed(user_id, &before, &state).await?;
            return Err(reason.into());
        }

        let result = match tokio::time::timeout(
            self.upstream_timeout,
            self.voice.transcribe(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.upstream_timeout.as_secs())),
        };
        let done = self.clock.now();

        match result {
            Ok(text) => {
                let mut failure = None;
                state.record_voice_call();
                settle(&mut failure, "usage", self.ledger.save(user_id, &state).await);
                settle(
                    &mut failure,
                    "call log entry",
                    self.calls
                        .append(CallLogEntry::ok(user_id, CallType::VoiceInput, done))
                        .await,
                );
                if let Some(e) = failure {
                    return Err(e);
                }
                log::info!(
                    "[gateway] Voice note transcribed for {} ({} this month)",
                    user_id,
                    state.voice_calls_this_month
                );
                Ok(text)
            }
            Err(e) => {
                let mut failure = None;
                settle(
                    &mut failure,
                    "usage",
                    self.save_if_changed(user_id, &before, &state).await,
                );
                settle(
                    &mut failure,
                    "call log entry",
                    self.calls
                        .append(CallLogEntry::error(
                            user_id,
                            CallType::VoiceInput,
                            done,
                            e.to_string(),
                        ))
                        .await,
                );
                if let Some(failure) = failure {
                    return Err(failure);
                }
                log::warn!(
                    "[gateway] Voice backend {} failed for {}: {}",
                    self.voice.backend_id(),
                    user_id,
                    e
                );
                Err(GatewayError::UpstreamUnavailable)
            }
        }
    }

    /// Persist a rollover that happened without a recorded call
    async fn save_if_changed(
        &self,
        user_id: &str,
        before: &UsagePeriodState,
        state: &UsagePeriodState,
    ) -> crate::error::Result<()> {
        if before != state {
            self.ledger.save(user_id, state).await?;
        }
        Ok(())
    }
}

/// Keep the first bookkeeping failure; later writes still run
fn settle(failure: &mut Option<GatewayError>, what: &str, result: crate::error::Result<()>) {
    if let Err(e) = result {
        log::error!("[gateway] Failed to record {}: {}", what, e);
        failure.get_or_insert(e.into());
    }
}

// ============================================================================
// Tests
// ============================================================================
