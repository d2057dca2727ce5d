//! Gateway types
//!
//! Records shared by the usage ledger, the credential pool and the access
//! gateway, plus the request/response payloads of the AI capabilities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Credential
// ============================================================================

/// Stored status of an upstream credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    #[default]
    Active,
    Disabled,
}

impl std::fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialStatus::Active => write!(f, "active"),
            CredentialStatus::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for CredentialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(CredentialStatus::Active),
            "disabled" => Ok(CredentialStatus::Disabled),
            _ => Err(format!("Unknown credential status: {}", s)),
        }
    }
}

/// Eligibility of a credential at a given instant
///
/// Derived from `status` and `disabled_until`, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// Can serve the next upstream call
    Eligible,
    /// Tripped by the circuit breaker, back in rotation at `disabled_until`
    CoolingDown,
    /// Switched off administratively, only an operator can bring it back
    Disabled,
}

impl std::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eligibility::Eligible => write!(f, "eligible"),
            Eligibility::CoolingDown => write!(f, "cooling_down"),
            Eligibility::Disabled => write!(f, "disabled"),
        }
    }
}

/// One upstream API key with its usage and failure state
///
/// Field names on disk follow the `gemini_keys.json` layout so existing pool
/// files load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque key material, unique within the pool
    #[serde(rename = "key")]
    pub identifier: String,
    /// Informational cap on upstream calls per accounting period
    #[serde(default)]
    pub quota_limit: u64,
    /// Successful calls served, only reset by an operator
    #[serde(default)]
    pub current_usage: u64,
    /// Time of the last successful call
    #[serde(default, rename = "last_used")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: CredentialStatus,
    /// Consecutive failures, zeroed by any success
    #[serde(default)]
    pub error_count: u32,
    /// Cooldown deadline set by the circuit breaker
    #[serde(default, rename = "last_disabled_until")]
    pub disabled_until: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a fresh, active credential
    pub fn new(identifier: impl Into<String>, quota_limit: u64) -> Self {
        Self {
            identifier: identifier.into(),
            quota_limit,
            current_usage: 0,
            last_used_at: None,
            status: CredentialStatus::Active,
            error_count: 0,
            disabled_until: None,
        }
    }

    /// Derive the credential's eligibility at `now`
    ///
    /// A passed cooldown deadline makes the credential eligible even though
    /// the breaker left `status = Disabled` behind; a disabled credential
    /// without a deadline stays out until an operator reactivates it.
    pub fn eligibility(&self, now: DateTime<Utc>) -> Eligibility {
        match (self.status, self.disabled_until) {
            (_, Some(until)) if until > now => Eligibility::CoolingDown,
            (CredentialStatus::Active, _) => Eligibility::Eligible,
            (CredentialStatus::Disabled, Some(_)) => Eligibility::Eligible,
            (CredentialStatus::Disabled, None) => Eligibility::Disabled,
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.eligibility(now) == Eligibility::Eligible
    }

    /// Apply a successful upstream call
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.current_usage += 1;
        self.error_count = 0;
        self.last_used_at = Some(now);
    }

    /// Apply a failed upstream call
    ///
    /// Returns `true` when this failure tripped the circuit breaker.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        failure_threshold: u32,
        cooldown: chrono::Duration,
    ) -> bool {
        self.error_count += 1;
        if self.error_count >= failure_threshold {
            self.status = CredentialStatus::Disabled;
            self.disabled_until = Some(now + cooldown);
            return true;
        }
        false
    }

    /// Bring a credential whose cooldown has elapsed back to a consistent
    /// `Active` record. Keeps `error_count`, so the next failure re-trips.
    ///
    /// Returns `true` if the record changed.
    pub fn settle_cooldown(&mut self, now: DateTime<Utc>) -> bool {
        match self.disabled_until {
            Some(until) if until <= now => {
                self.status = CredentialStatus::Active;
                self.disabled_until = None;
                true
            }
            _ => false,
        }
    }

    /// Operator reset: active, no cooldown, no error streak
    pub fn reactivate(&mut self) {
        self.status = CredentialStatus::Active;
        self.disabled_until = None;
        self.error_count = 0;
    }

    /// Short, stable digest of the key for logs and audit entries
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.identifier)
    }
}

/// Short, stable digest of a key so raw secrets never reach logs
pub fn fingerprint(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Plans and Quota
// ============================================================================

/// Quota configuration of a subscription plan
///
/// Negative means unlimited, zero means the capability is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanLimits {
    #[serde(default)]
    pub ai_monthly: i64,
    #[serde(default)]
    pub ai_daily: i64,
    #[serde(default)]
    pub voice_monthly: i64,
}

impl PlanLimits {
    pub fn new(ai_monthly: i64, ai_daily: i64, voice_monthly: i64) -> Self {
        Self {
            ai_monthly,
            ai_daily,
            voice_monthly,
        }
    }

    /// Every capability off
    pub fn disabled() -> Self {
        Self::default()
    }

    /// No limits on any dimension
    pub fn unlimited() -> Self {
        Self::new(-1, -1, -1)
    }
}

/// A rate-limited capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Ai,
    Voice,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Ai => write!(f, "AI"),
            Capability::Voice => write!(f, "Voice"),
        }
    }
}

/// Quota window that was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDimension {
    Monthly,
    Daily,
}

impl std::fmt::Display for QuotaDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaDimension::Monthly => write!(f, "monthly"),
            QuotaDimension::Daily => write!(f, "daily"),
        }
    }
}

/// Why admission control turned a call away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    QuotaExceeded {
        capability: Capability,
        dimension: QuotaDimension,
    },
    CapabilityDisabled {
        capability: Capability,
    },
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenialReason::QuotaExceeded {
                capability,
                dimension,
            } => write!(f, "{} {} quota exceeded", capability, dimension),
            DenialReason::CapabilityDisabled { capability } => {
                write!(f, "{} input not available for your plan", capability)
            }
        }
    }
}

// ============================================================================
// Usage Period State
// ============================================================================

/// `YYYY-MM` key of the month containing `now`
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// `YYYY-MM-DD` key of the day containing `now`
pub fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Per-user consumption counters for the current day and month
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePeriodState {
    #[serde(default)]
    pub ai_calls_this_month: u64,
    #[serde(default)]
    pub ai_calls_today: u64,
    #[serde(default)]
    pub voice_calls_this_month: u64,
    #[serde(default)]
    pub last_reset_month: Option<String>,
    #[serde(default)]
    pub last_reset_day: Option<String>,
}

impl UsagePeriodState {
    /// Zero the monthly counters if `now` is in a different month
    ///
    /// Returns `true` if a rollover happened.
    pub fn roll_month(&mut self, now: DateTime<Utc>) -> bool {
        let key = month_key(now);
        if self.last_reset_month.as_deref() == Some(key.as_str()) {
            return false;
        }
        self.ai_calls_this_month = 0;
        self.voice_calls_this_month = 0;
        self.last_reset_month = Some(key);
        true
    }

    /// Zero the daily counter if `now` is in a different day
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let key = day_key(now);
        if self.last_reset_day.as_deref() == Some(key.as_str()) {
            return false;
        }
        self.ai_calls_today = 0;
        self.last_reset_day = Some(key);
        true
    }

    pub fn record_ai_call(&mut self) {
        self.ai_calls_this_month += 1;
        self.ai_calls_today += 1;
    }

    pub fn record_voice_call(&mut self) {
        self.voice_calls_this_month += 1;
    }
}

// ============================================================================
// Audit Records
// ============================================================================

/// Which counter a reset-log record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetKind {
    AiMonth,
    VoiceMonth,
    AiDay,
}

impl std::fmt::Display for ResetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetKind::AiMonth => write!(f, "ai_month"),
            ResetKind::VoiceMonth => write!(f, "voice_month"),
            ResetKind::AiDay => write!(f, "ai_day"),
        }
    }
}

/// Entry of the append-only reset log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetLogEntry {
    #[serde(rename = "username")]
    pub user_id: String,
    pub kind: ResetKind,
    pub ts: DateTime<Utc>,
}

/// Kind of gateway call recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    GeneratePlan,
    VoiceInput,
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallType::GeneratePlan => write!(f, "generate_plan"),
            CallType::VoiceInput => write!(f, "voice_input"),
        }
    }
}

/// Outcome of an audited call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ok,
    Error,
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallStatus::Ok => write!(f, "ok"),
            CallStatus::Error => write!(f, "error"),
        }
    }
}

/// Entry of the append-only AI call log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub id: String,
    #[serde(rename = "username")]
    pub user_id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub ts: DateTime<Utc>,
    pub status: CallStatus,
    /// Upstream error detail, only on failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fingerprint of the credential that was tried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl CallLogEntry {
    pub fn ok(user_id: &str, call_type: CallType, ts: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            call_type,
            ts,
            status: CallStatus::Ok,
            error: None,
            credential: None,
        }
    }

    pub fn error(
        user_id: &str,
        call_type: CallType,
        ts: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: CallStatus::Error,
            error: Some(error.into()),
            ..Self::ok(user_id, call_type, ts)
        }
    }

    pub fn with_credential(mut self, fingerprint: Option<String>) -> Self {
        self.credential = fingerprint;
        self
    }
}

// ============================================================================
// Capability Payloads
// ============================================================================

/// Input of the budget planning capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub income: f64,
    #[serde(default)]
    pub goals: Vec<String>,
}

/// Monthly budget split produced by the planning capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutput {
    pub savings: f64,
    pub food: f64,
    pub transport: f64,
    pub others: f64,
    #[serde(default)]
    pub goals: Vec<String>,
}

/// A plan together with the credential that served it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServedPlan {
    pub plan: PlanOutput,
    /// Fingerprint of the serving credential, for observability only
    pub credential: Option<String>,
}

/// Input of the voice transcription capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceRequest {
    pub audio_base64: String,
}

// ============================================================================
// Tests
// ============================================================================
