//! # fintrack-core
//!
//! Core logic for Fintrack's AI access gateway - shared by the CLI and any
//! HTTP front end.
//!
//! This crate provides:
//! - Gateway configuration (`config` module)
//! - SQLite document storage (`db` module)
//! - Quota, credential pool and audit services (`services` module)
//! - Unified error handling (`error` module)

pub mod config;
pub mod db;
pub mod error;
pub mod services;

// Re-exports for convenience
pub use config::{GatewayConfig, StoreBackend};
pub use db::Database;
pub use error::{Error, Result};

// Re-export commonly used types from services
pub use services::gateway::{
    AccessGateway, CallLogEntry, Capability, Credential, GatewayError, PlanLimits, PlanOutput,
    PlanRequest, ServedPlan, UsagePeriodState, VoiceRequest,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_version_format() {
        let v = version();
        // Should be semver format: x.y.z
        let parts: Vec<&str> = v.split('.').collect();
        assert_eq!(parts.len(), 3, "Version should be in x.y.z format");
    }
}
