//! Transport configuration loading.
//!
//! Settings come from a YAML file when one is given, with environment
//! variables filling the gaps, so an embedded host can run with no file at
//! all.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::{IsolationLevel, TransactionOptions};
use crate::queue::QueueConfig;

/// Top-level transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub transaction: TransactionSettings,
}

impl TransportConfig {
    /// Load settings from a YAML file.
    ///
    /// # Errors
    /// Returns error if the file doesn't exist or has invalid format
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        serde_yaml::from_str(&contents).map_err(|e| format!("Failed to parse YAML: {}", e))
    }

    /// Settings from environment variables and defaults only.
    pub fn from_env() -> Self {
        Self {
            queue: QueueSettings::default(),
            transaction: TransactionSettings::default(),
        }
    }
}

/// Queue connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub url: String,
    pub stream_name: String,
    pub queue_name: String,
    pub max_age_secs: u64,
    pub max_bytes: i64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        let defaults = QueueConfig::default();
        Self {
            url: defaults.url,
            stream_name: defaults.stream_name,
            queue_name: std::env::var("QUEUE_NAME").unwrap_or_else(|_| "default".to_string()),
            max_age_secs: defaults.max_age.as_secs(),
            max_bytes: defaults.max_bytes,
        }
    }
}

impl QueueSettings {
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            url: self.url.clone(),
            stream_name: self.stream_name.clone(),
            max_age: Duration::from_secs(self.max_age_secs),
            max_bytes: self.max_bytes,
        }
    }
}

/// Transactional scope settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionSettings {
    pub isolation: IsolationLevel,
    /// `null` in the file means no timeout at all (the debugging override).
    pub timeout_secs: Option<u64>,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::Serializable,
            timeout_secs: Some(TransactionOptions::DEFAULT_TIMEOUT.as_secs()),
        }
    }
}

impl TransactionSettings {
    pub fn to_options(&self) -> TransactionOptions {
        TransactionOptions {
            isolation: self.isolation,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}
