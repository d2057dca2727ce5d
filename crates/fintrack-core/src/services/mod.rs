//! Services module

pub mod gateway;

pub use gateway::{
    AccessGateway, AiBackend, AuditSummary, BackendError, CredentialPool, DocumentStore,
    GatewayError, PlanCatalog, UsageLedger, VoiceBackend,
};
