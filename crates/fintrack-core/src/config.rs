//! Gateway configuration
//!
//! Resolves where fintrack keeps its documents, which plan catalog to load,
//! and the tuning knobs of the credential circuit breaker.
//!
//! Priority for every setting: explicit value > environment variable > default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Consecutive failures that trip a credential's circuit breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// How long a tripped credential stays out of rotation
pub const DEFAULT_COOLDOWN_SECS: u64 = 5 * 60;

/// Longest cooldown accepted by `validate()`
pub const MAX_COOLDOWN_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound on a single upstream call
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Shortest upstream timeout accepted by `validate()`
pub const MIN_UPSTREAM_TIMEOUT_SECS: u64 = 1;

/// Environment variable overriding the data directory
pub const ENV_DATA_DIR: &str = "FINTRACK_DATA_DIR";
/// Environment variable overriding the plan catalog path
pub const ENV_PLANS_PATH: &str = "FINTRACK_PLANS_PATH";
/// Environment variable overriding the upstream timeout (seconds)
pub const ENV_UPSTREAM_TIMEOUT: &str = "FINTRACK_UPSTREAM_TIMEOUT_SECS";
/// Environment variable overriding the SQLite database path
pub const ENV_DB_PATH: &str = "FINTRACK_DB_PATH";

// ============================================================================
// Store Backend
// ============================================================================

/// Which document store backs the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// One JSON file per document under the data directory
    #[default]
    Json,
    /// A single SQLite database with a `documents` table
    Sqlite,
    /// Process-local, nothing survives a restart
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Json => write!(f, "json"),
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" | "file" | "files" => Ok(StoreBackend::Json),
            "sqlite" | "db" => Ok(StoreBackend::Sqlite),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            _ => Err(format!("Unknown store backend: {}", s)),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Runtime configuration for the access gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Directory holding flat-file documents (and the default database)
    pub data_dir: PathBuf,
    /// Plan catalog (`account_types.json` format)
    pub plans_path: PathBuf,
    /// SQLite database file, used when `backend` is `Sqlite`
    pub db_path: PathBuf,
    /// Document store backend
    pub backend: StoreBackend,
    /// Upper bound on one upstream call, in seconds
    pub upstream_timeout_secs: u64,
    /// Consecutive failures before a credential cools down
    pub failure_threshold: u32,
    /// Cooldown length, in seconds
    pub cooldown_secs: u64,
}

impl GatewayConfig {
    /// Build a configuration rooted at `data_dir`, all other values default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            plans_path: data_dir.join("config").join("account_types.json"),
            db_path: data_dir.join("fintrack.db"),
            data_dir,
            backend: StoreBackend::default(),
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
        }
    }

    /// Resolve the configuration from the environment
    ///
    /// `data_dir` wins over `FINTRACK_DATA_DIR`, which wins over the
    /// platform data directory.
    pub fn from_env(data_dir: Option<&str>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => expand_path(dir),
            None => match std::env::var(ENV_DATA_DIR) {
                Ok(dir) => expand_path(&dir),
                Err(_) => default_data_dir()?,
            },
        };

        let mut config = Self::with_data_dir(data_dir);

        if let Ok(path) = std::env::var(ENV_PLANS_PATH) {
            config.plans_path = expand_path(&path);
        }
        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            config.db_path = expand_path(&path);
        }
        if let Ok(raw) = std::env::var(ENV_UPSTREAM_TIMEOUT) {
            config.upstream_timeout_secs = raw.trim().parse().map_err(|_| {
                Error::config(format!("{} must be a whole number of seconds, got {:?}", ENV_UPSTREAM_TIMEOUT, raw))
            })?;
        }

        Ok(config.validate())
    }

    /// Validate and normalize the configuration
    pub fn validate(&self) -> Self {
        Self {
            data_dir: self.data_dir.clone(),
            plans_path: self.plans_path.clone(),
            db_path: self.db_path.clone(),
            backend: self.backend,
            upstream_timeout_secs: self.upstream_timeout_secs.max(MIN_UPSTREAM_TIMEOUT_SECS),
            failure_threshold: self.failure_threshold.max(1),
            cooldown_secs: self.cooldown_secs.min(MAX_COOLDOWN_SECS),
        }
    }

    /// Set the store backend
    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs.min(MAX_COOLDOWN_SECS) as i64)
    }
}

/// Platform data directory for fintrack
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "fintrack", "Fintrack")
        .ok_or_else(|| Error::config("Could not determine project directories"))?;
    Ok(dirs.data_dir().to_path_buf())
}

/// Expand `~` and environment variables in a user-supplied path
fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            log::warn!("[config] Could not expand path {}: {}", raw, e);
            PathBuf::from(raw)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't run in parallel
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [ENV_DATA_DIR, ENV_PLANS_PATH, ENV_UPSTREAM_TIMEOUT, ENV_DB_PATH] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_with_data_dir_defaults() {
        let config = GatewayConfig::with_data_dir("/srv/fintrack");
        assert_eq!(config.plans_path, PathBuf::from("/srv/fintrack/config/account_types.json"));
        assert_eq!(config.db_path, PathBuf::from("/srv/fintrack/fintrack.db"));
        assert_eq!(config.backend, StoreBackend::Json);
        assert_eq!(config.failure_threshold, DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(config.cooldown(), chrono::Duration::minutes(5));
        assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_dir_beats_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var(ENV_DATA_DIR, "/tmp/from-env");
        let config = GatewayConfig::from_env(Some("/tmp/explicit")).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/explicit"));
        clear_env();
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var(ENV_DATA_DIR, "/tmp/fintrack-env");
        std::env::set_var(ENV_PLANS_PATH, "/tmp/plans.json");
        std::env::set_var(ENV_UPSTREAM_TIMEOUT, "7");
        let config = GatewayConfig::from_env(None).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/fintrack-env"));
        assert_eq!(config.plans_path, PathBuf::from("/tmp/plans.json"));
        assert_eq!(config.upstream_timeout_secs, 7);
        clear_env();
    }

    #[test]
    fn test_bad_timeout_is_config_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var(ENV_UPSTREAM_TIMEOUT, "soon");
        let result = GatewayConfig::from_env(Some("/tmp/x"));
        assert!(matches!(result, Err(Error::Config(_))));
        clear_env();
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = GatewayConfig::with_data_dir("/tmp/x");
        config.upstream_timeout_secs = 0;
        config.failure_threshold = 0;
        let validated = config.validate();
        assert_eq!(validated.upstream_timeout_secs, MIN_UPSTREAM_TIMEOUT_SECS);
        assert_eq!(validated.failure_threshold, 1);
    }

    #[test]
    fn test_oversized_cooldown_is_capped() {
        let mut config = GatewayConfig::with_data_dir("/tmp/x");
        config.cooldown_secs = u64::MAX;
        assert_eq!(config.cooldown(), chrono::Duration::days(7));

        let validated = config.validate();
        assert_eq!(validated.cooldown_secs, MAX_COOLDOWN_SECS);
        assert!(validated.cooldown() > chrono::Duration::zero());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("json".parse::<StoreBackend>().unwrap(), StoreBackend::Json);
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("redis".parse::<StoreBackend>().is_err());
        assert_eq!(StoreBackend::Sqlite.to_string(), "sqlite");
    }
}
