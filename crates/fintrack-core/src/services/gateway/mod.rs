//! AI access gateway
//!
//! Sits between users and the external AI/voice capabilities. Every request
//! passes a per-plan quota check against the user's usage ledger, borrows a
//! credential from a rotating pool with a per-key circuit breaker, and leaves
//! an entry in the append-only call log.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ AccessGateway                                           │
//! │   - request_ai_plan()                                   │
//! │   - request_voice_transcription()                       │
//! └─────────────────────────────────────────────────────────┘
//!      │              │                │              │
//!      ▼              ▼                ▼              ▼
//! ┌──────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐
//! │PlanCatal.│  │UsageLedger │  │Credential- │  │ CallLog  │
//! │limits_for│  │lock/roll/  │  │Pool select/│  │ ResetLog │
//! │          │  │check/save  │  │record      │  │          │
//! └──────────┘  └────────────┘  └────────────┘  └──────────┘
//!                     │                │              │
//!                     ▼                ▼              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │ trait DocumentStore (memory | json files | sqlite)      │
//! └─────────────────────────────────────────────────────────┘
//!
//!      upstream: trait AiBackend / trait VoiceBackend
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fintrack_core::config::GatewayConfig;
//! use fintrack_core::services::gateway::{AccessGateway, PlanRequest};
//!
//! let gateway = AccessGateway::open(&GatewayConfig::from_env(None)?).await?;
//! gateway.pool().add_credential("AIza...", 100_000).await?;
//!
//! match gateway.request_ai_plan("anna", "pro_basic", request).await {
//!     Ok(served) => println!("{:?}", served.plan),
//!     Err(e) => eprintln!("{} ({})", e.user_message(), e.status_code()),
//! }
//! ```

pub mod audit;
pub mod backends;
pub mod clock;
pub mod ledger;
pub mod plans;
pub mod pool;
pub mod provider;
pub mod service;
pub mod store;
pub mod types;

// Re-export main types
pub use types::{
    CallLogEntry, CallStatus, CallType, Capability, Credential, CredentialStatus, DenialReason,
    Eligibility, PlanLimits, PlanOutput, PlanRequest, QuotaDimension, ResetKind, ResetLogEntry,
    ServedPlan, UsagePeriodState, VoiceRequest,
};

// Re-export capability traits and errors
pub use provider::{AiBackend, BackendError, GatewayError, VoiceBackend};

// Re-export components
pub use audit::{AppendLog, AuditSummary, CallLog, ResetLog};
pub use backends::{BudgetPlanner, StubTranscriber};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{check_ai_quota, check_voice_quota, UsageLedger};
pub use plans::{PlanCatalog, FALLBACK_PLAN};
pub use pool::CredentialPool;
pub use service::{AccessGateway, GatewayBuilder};
pub use store::{open_store, DocumentStore, JsonFileStore, MemoryStore, SqliteStore};
