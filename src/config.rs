use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHANNEL_TIMEOUT_MS, DEFAULT_CONFIG_PATH, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_LOG_DIR, DEFAULT_LOG_FILE, DEFAULT_RETRY_BACKOFF_MS, DEFAULT_SQLITE_PATH,
};
use crate::domain::Operator;
use crate::error::{FeedbackError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub notifications: NotificationConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub vocabulary: VocabularyConfig,
    pub operators: Vec<Operator>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub email_webhook_url: Option<String>,
    pub sms_webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_CHANNEL_TIMEOUT_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            email_webhook_url: None,
            sms_webhook_url: None,
        }
    }
}

impl NotificationConfig {
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: DEFAULT_SQLITE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus scrape listener, e.g. "127.0.0.1:9898". Disabled when unset.
    pub listen_addr: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_name: String,
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: DEFAULT_LOG_DIR.to_string(),
            file_name: DEFAULT_LOG_FILE.to_string(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    pub departments: Option<Vec<String>>,
    pub locations: Option<Vec<String>>,
    pub issue_types: Option<Vec<String>>,
}

impl Config {
    /// Load from `FEEDBACK_CONFIG` (or `config.toml`), then apply env overrides.
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let config_path =
            std::env::var("FEEDBACK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(config_path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            FeedbackError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path, e
            ))
        })?;
        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.notifications.retry_attempts == 0 {
            return Err(FeedbackError::Config(
                "notifications.retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FEEDBACK_SQLITE_PATH") {
            self.storage.sqlite_path = path;
        }
        if let Ok(url) = std::env::var("FEEDBACK_EMAIL_WEBHOOK_URL") {
            self.notifications.email_webhook_url = Some(url);
        }
        if let Ok(url) = std::env::var("FEEDBACK_SMS_WEBHOOK_URL") {
            self.notifications.sms_webhook_url = Some(url);
        }
        if let Ok(addr) = std::env::var("FEEDBACK_METRICS_ADDR") {
            self.metrics.listen_addr = Some(addr);
        }
        if let Ok(dir) = std::env::var("FEEDBACK_LOG_DIR") {
            self.logging.directory = dir;
        }
    }
}
