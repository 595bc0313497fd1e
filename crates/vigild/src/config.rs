use anyhow::{Context, Result};
use std::path::PathBuf;
use vigil_core::DecisionPolicy;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite enrollment store.
    pub db_path: PathBuf,
    /// Optional TOML file overriding the decision policy.
    pub policy_path: Option<PathBuf>,
    /// Serve on the session bus instead of the system bus.
    pub session_bus: bool,
    /// Depth of the request queue in front of the engine thread.
    pub request_queue: usize,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let db_path = std::env::var("VIGIL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| vigil_store::default_db_path());

        Self {
            db_path,
            policy_path: std::env::var("VIGIL_POLICY_PATH").ok().map(PathBuf::from),
            session_bus: std::env::var("VIGIL_SESSION_BUS")
                .map(|v| v == "1")
                .unwrap_or(false),
            request_queue: env_usize("VIGIL_REQUEST_QUEUE", 16).max(1),
        }
    }

    /// Decision policy: defaults, or the configured TOML file.
    pub fn policy(&self) -> Result<DecisionPolicy> {
        match &self.policy_path {
            Some(path) => DecisionPolicy::from_toml_file(path)
                .context("loading decision policy from VIGIL_POLICY_PATH"),
            None => Ok(DecisionPolicy::default()),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
