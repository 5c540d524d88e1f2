use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

const ENV_PREFIX: &str = "OSPROBE_";

/// Settings for one collection run. Loadable from a TOML file, overridable
/// through `OSPROBE_`-prefixed environment variables, validated at run
/// start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Concurrent probe units per batch.
    pub concurrency: usize,

    /// Per-probe timeout in seconds (port connects are bounded at 2s
    /// regardless).
    pub timeout_secs: u64,

    /// Also scan well-known TCP ports on host targets.
    pub deep_scan: bool,

    pub user_agent: String,

    /// Concurrency for the port-scan batch; connects are cheap, so this
    /// runs wider than the platform fan-out.
    pub port_scan_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout_secs: 10,
            deep_scan: false,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            port_scan_concurrency: 20,
        }
    }
}

impl Config {
    /// Load from a TOML file (or the default location), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);

        let mut config = if config_path.exists() {
            debug!("Loading config from: {}", config_path.display());
            let content = std::fs::read_to_string(&config_path)
                .context(format!("Failed to read config file: {}", config_path.display()))?;
            toml::from_str(&content)
                .context(format!("Failed to parse config file: {}", config_path.display()))?
        } else {
            debug!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_environment_vars();
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".osprobe/config.toml")
    }

    fn apply_environment_vars(&mut self) {
        for (key, value) in std::env::vars() {
            let Some(config_key) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match config_key {
                "CONCURRENCY" => {
                    if let Ok(n) = value.parse::<usize>() {
                        self.concurrency = n;
                        debug!("Set concurrency from environment: {}", n);
                    }
                }
                "TIMEOUT_SECS" => {
                    if let Ok(n) = value.parse::<u64>() {
                        self.timeout_secs = n;
                        debug!("Set timeout_secs from environment: {}", n);
                    }
                }
                "DEEP_SCAN" => {
                    if let Ok(b) = value.parse::<bool>() {
                        self.deep_scan = b;
                        debug!("Set deep_scan from environment: {}", b);
                    }
                }
                "USER_AGENT" => {
                    debug!("Set user_agent from environment");
                    self.user_agent = value;
                }
                _ => {
                    debug!("Unhandled environment variable: {}", key);
                }
            }
        }
    }

    /// Reject configurations the engine cannot run with. An invalid
    /// configuration is a fatal, not a degraded finding.
    pub fn validate(&self) -> EngineResult<()> {
        if self.concurrency == 0 || self.concurrency > 20 {
            return Err(EngineError::InvalidConfig(format!(
                "concurrency must be between 1 and 20, got {}",
                self.concurrency
            )));
        }
        if self.timeout_secs < 5 || self.timeout_secs > 60 {
            return Err(EngineError::InvalidConfig(format!(
                "timeout_secs must be between 5 and 60, got {}",
                self.timeout_secs
            )));
        }
        if self.user_agent.is_empty() {
            return Err(EngineError::InvalidConfig(
                "user_agent must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}
