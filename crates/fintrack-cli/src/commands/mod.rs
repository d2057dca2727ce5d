//! CLI commands module
//!
//! Contains all CLI command implementations.

pub mod ai;
pub mod audit;
pub mod config;
pub mod keys;
pub mod plans;
pub mod usage;

use crate::output::OutputFormat;
use fintrack_core::{AccessGateway, GatewayConfig};

/// Shared context for all commands
pub struct Context {
    pub gateway: AccessGateway,
    pub config: GatewayConfig,
    pub format: OutputFormat,
    pub quiet: bool,
}
