//! Configuration loader and validator for the settlement engine.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub platform: Platform,
    pub webhook: Webhook,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    pub max_backoff_seconds: u64,
    /// Days after the end of a pay period before an unpaid payslip is
    /// considered overdue by the sweep.
    pub overdue_after_days: u32,
}

/// Platform clearing account receiving the commission leg, and the name
/// stamped on settlement artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub name: String,
    pub bank_bsb: String,
    pub bank_account: String,
}

/// Notification webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Webhook {
    pub url: String,
    pub token: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if cfg.app.overdue_after_days == 0 {
        return Err(ConfigError::Invalid("app.overdue_after_days must be > 0"));
    }

    if cfg.platform.name.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.name must be non-empty"));
    }
    if cfg.platform.bank_bsb.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.bank_bsb must be non-empty"));
    }
    if cfg.platform.bank_account.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "platform.bank_account must be non-empty",
        ));
    }

    if cfg.webhook.url.trim().is_empty() {
        return Err(ConfigError::Invalid("webhook.url must be non-empty"));
    }

    Ok(())
}

/// Example configuration, also used as the test fixture.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 500
  max_backoff_seconds: 60
  overdue_after_days: 7

platform:
  name: "OzzieWork"
  bank_bsb: "083-001"
  bank_account: "112233445"

webhook:
  url: "https://hooks.example.com/ozziework/events"
  token: "YOUR_WEBHOOK_TOKEN"
"#
}
