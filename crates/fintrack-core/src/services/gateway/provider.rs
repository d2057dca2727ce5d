//! Upstream capability traits and gateway error types
//!
//! Defines the interface the external AI and voice capabilities implement,
//! and the typed results the gateway hands back to callers.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{
    Capability, DenialReason, PlanOutput, PlanRequest, QuotaDimension, VoiceRequest,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the access gateway
///
/// Denials are ordinary values of this type, not failures of the gateway
/// itself. Every path through the gateway ends in `Ok` or one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// A monthly or daily quota is used up
    #[error("{capability} {dimension} quota exceeded")]
    QuotaExceeded {
        capability: Capability,
        dimension: QuotaDimension,
    },

    /// The user's plan does not include the capability
    #[error("{0} input not available for your plan")]
    CapabilityDisabled(Capability),

    /// No eligible credential, or the upstream call failed or timed out
    #[error("AI service temporarily unavailable")]
    UpstreamUnavailable,

    /// Administrative lookup of something that is not there
    #[error("Not found: {0}")]
    NotFound(String),

    /// The document store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// The request task died before producing a result
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status the routing layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::QuotaExceeded { .. } => 429,
            GatewayError::CapabilityDisabled(_) => 403,
            GatewayError::UpstreamUnavailable => 502,
            GatewayError::NotFound(_) => 404,
            GatewayError::Storage(_) | GatewayError::Internal(_) => 500,
        }
    }

    /// Whether retrying the same request later can succeed without a plan change
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::QuotaExceeded { .. } | GatewayError::UpstreamUnavailable
        )
    }

    /// End-user guidance telling "later today" from "next month" from "upgrade"
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::QuotaExceeded {
                capability,
                dimension: QuotaDimension::Daily,
            } => format!(
                "You have used today's {} allowance. Try again tomorrow.",
                capability
            ),
            GatewayError::QuotaExceeded {
                capability,
                dimension: QuotaDimension::Monthly,
            } => format!(
                "You have used this month's {} allowance. Try again next month or upgrade your plan.",
                capability
            ),
            GatewayError::CapabilityDisabled(capability) => format!(
                "{} input is not part of your plan. Upgrade to unlock it.",
                capability
            ),
            GatewayError::UpstreamUnavailable => {
                "The AI service is temporarily unavailable. Please try again shortly.".to_string()
            }
            GatewayError::NotFound(what) => format!("{} was not found.", what),
            GatewayError::Storage(_) | GatewayError::Internal(_) => {
                "Something went wrong on our side.".to_string()
            }
        }
    }
}

impl From<DenialReason> for GatewayError {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::QuotaExceeded {
                capability,
                dimension,
            } => GatewayError::QuotaExceeded {
                capability,
                dimension,
            },
            DenialReason::CapabilityDisabled { capability } => {
                GatewayError::CapabilityDisabled(capability)
            }
        }
    }
}

impl From<crate::error::Error> for GatewayError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::NotFound(what) => GatewayError::NotFound(what),
            other => GatewayError::Storage(other.to_string()),
        }
    }
}

/// Errors returned by an upstream capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The call did not finish within the gateway's timeout
    #[error("Upstream call timed out after {0}s")]
    Timeout(u64),

    /// Upstream answered but refused the request
    #[error("Upstream rejected the request: {0}")]
    Rejected(String),

    /// The payload could not be sent as given
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// General/unknown error
    #[error("{0}")]
    Other(String),
}

// ============================================================================
// Capability Traits
// ============================================================================

/// External AI capability that turns a planning request into a budget plan
///
/// Implementations receive the key chosen by the credential pool, or `None`
/// when the pool had nothing eligible; they are expected to fail in that case
/// unless they need no key at all.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Identifier used in logs
    fn backend_id(&self) -> &'static str;

    /// Make one upstream attempt
    async fn invoke(
        &self,
        credential: Option<&str>,
        request: &PlanRequest,
    ) -> Result<PlanOutput, BackendError>;
}

/// External speech-to-text capability
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    fn backend_id(&self) -> &'static str;

    async fn transcribe(&self, request: &VoiceRequest) -> Result<String, BackendError>;
}

// ============================================================================
// Tests
// ============================================================================
