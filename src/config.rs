use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::agents::WorkerOptions;
use crate::lifecycle::LifecycleConfig;
use crate::locks::LockConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum HistoryConfig {
    #[default]
    Memory,
    Jsonl { path: PathBuf },
    Postgres { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_port: u16,
    pub workspace_root: PathBuf,
    pub history: HistoryConfig,
    pub locks: LockConfig,
    pub lifecycle: LifecycleConfig,
    pub worker: WorkerOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_port: 8080,
            workspace_root: PathBuf::from("."),
            history: HistoryConfig::default(),
            locks: LockConfig::default(),
            lifecycle: LifecycleConfig::default(),
            worker: WorkerOptions::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Read a TOML file, then let the environment override it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let raw = lookup(key)?;
            match raw.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring {}={:?}: not a valid value", key, raw);
                    None
                }
            }
        }

        if let Some(port) = parsed(&lookup, "CONCORD_API_PORT") {
            self.api_port = port;
        }
        if let Some(root) = lookup("CONCORD_WORKSPACE") {
            self.workspace_root = PathBuf::from(root);
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.history = HistoryConfig::Postgres { url };
        } else if let Some(path) = lookup("CONCORD_HISTORY_PATH") {
            self.history = HistoryConfig::Jsonl {
                path: PathBuf::from(path),
            };
        }

        if let Some(ttl) = parsed(&lookup, "CONCORD_LOCK_TTL_SECS") {
            self.locks.default_ttl_secs = ttl;
        }
        if let Some(wait) = parsed(&lookup, "CONCORD_LOCK_WAIT_MS") {
            self.locks.lock_wait_ms = wait;
        }
        if let Some(interval) = parsed(&lookup, "CONCORD_HEALTH_INTERVAL_SECS") {
            self.lifecycle.health_check_interval_secs = interval;
        }
        if let Some(timeout) = parsed(&lookup, "CONCORD_HEALTH_TIMEOUT_MS") {
            self.lifecycle.health_check_timeout_ms = timeout;
        }
        if let Some(auto_recover) = parsed(&lookup, "CONCORD_AUTO_RECOVER") {
            self.lifecycle.auto_recover = auto_recover;
        }
        if let Some(max) = parsed(&lookup, "CONCORD_MAX_CONCURRENT_TASKS") {
            self.worker.max_concurrent_tasks = max;
        }
    }
}
