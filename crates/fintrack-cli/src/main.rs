//! Fintrack CLI - AI access gateway administration
//!
//! A command-line interface for managing the upstream key pool, inspecting
//! plans, usage and the audit trail, and sending requests through the gateway.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fintrack_core::{AccessGateway, GatewayConfig, StoreBackend};

#[derive(Parser)]
#[command(name = "fintrack")]
#[command(author, version, about = "AI access gateway CLI for Fintrack", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Override data directory (or set FINTRACK_DATA_DIR env var)
    #[arg(long, env = "FINTRACK_DATA_DIR", global = true)]
    data_dir: Option<String>,

    /// Document store: json (default), sqlite or memory
    #[arg(long, env = "FINTRACK_BACKEND", global = true, default_value = "json")]
    backend: StoreBackend,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the upstream API key pool
    Keys {
        #[command(subcommand)]
        action: commands::keys::KeysAction,
    },

    /// Show subscription plans and their limits
    Plans {
        #[command(subcommand)]
        action: commands::plans::PlansAction,
    },

    /// Show a user's quota usage
    Usage {
        #[command(subcommand)]
        action: commands::usage::UsageAction,
    },

    /// Send a request through the gateway
    Ai {
        #[command(subcommand)]
        action: commands::ai::AiAction,
    },

    /// Inspect the call and reset logs
    Audit {
        #[command(subcommand)]
        action: commands::audit::AuditAction,
    },

    /// Show the resolved configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Resolve configuration
    let config = GatewayConfig::from_env(cli.data_dir.as_deref())?.with_backend(cli.backend);
    log::debug!("[cli] Using {} store under {}", config.backend, config.data_dir.display());

    // Open the gateway
    let gateway = AccessGateway::open(&config).await?;

    // Create context for commands
    let ctx = commands::Context {
        gateway,
        config,
        format: cli.format,
        quiet: cli.quiet,
    };

    // Execute command
    match cli.command {
        Commands::Keys { action } => commands::keys::execute(&ctx, action).await,
        Commands::Plans { action } => commands::plans::execute(&ctx, action).await,
        Commands::Usage { action } => commands::usage::execute(&ctx, action).await,
        Commands::Ai { action } => commands::ai::execute(&ctx, action).await,
        Commands::Audit { action } => commands::audit::execute(&ctx, action).await,
        Commands::Config { action } => commands::config::execute(&ctx, action).await,
    }
}
