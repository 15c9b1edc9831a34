use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TriageError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_total")]
    pub max_total: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            page_size: default_page_size(),
            max_total: default_max_total(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Falls back to the GEMINI_API_KEY environment variable when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClassificationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            api_key: None,
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// User rules handed to the prompt builder alongside the fixed category set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    #[serde(default = "default_policy")]
    pub policy: String,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Label removed from every classified item
    #[serde(default = "default_inbox_label_id")]
    pub inbox_label_id: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            inbox_label_id: default_inbox_label_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
}

fn default_query() -> String {
    "is:unread in:inbox".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_max_total() -> usize {
    50
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_inbox_label_id() -> String {
    "INBOX".to_string()
}

fn default_policy() -> String {
    [
        "Please follow these user-specific categorization rules:",
        "- Treat advertisements, newsletters, and mass mailings as 'Junk' unless they name an organization the user is directly involved with.",
        "- Emails about interviews, job offers, or internship opportunities are 'Time Sensitive'.",
        "- Job search alerts or listings from aggregator services are 'Junk', even if they mention jobs or deadlines.",
        "- Your priority is to reduce clutter. Only truly actionable items are 'Time Sensitive'.",
    ]
    .join("\n")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TriageError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TriageError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TriageError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.fetch.query.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "fetch.query cannot be empty".to_string(),
            ));
        }

        // Gmail caps messages.list at 500 results per page
        if self.fetch.page_size == 0 || self.fetch.page_size > 500 {
            return Err(TriageError::ConfigError(
                "fetch.page_size must be between 1 and 500".to_string(),
            ));
        }

        if self.fetch.max_total == 0 {
            return Err(TriageError::ConfigError(
                "fetch.max_total must be at least 1".to_string(),
            ));
        }

        if self.classification.model.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "classification.model cannot be empty".to_string(),
            ));
        }

        if !self.classification.api_base.starts_with("http") {
            return Err(TriageError::ConfigError(format!(
                "Invalid classification.api_base: '{}'. Must be an http(s) URL",
                self.classification.api_base
            )));
        }

        if self.classification.retries == 0 {
            return Err(TriageError::ConfigError(
                "classification.retries must be at least 1".to_string(),
            ));
        }

        if self.classification.timeout_secs == 0 {
            return Err(TriageError::ConfigError(
                "classification.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.labels.inbox_label_id.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "labels.inbox_label_id cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Resolve the model API key from config, then environment
    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = self.classification.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }

        std::env::var("GEMINI_API_KEY").map_err(|_| {
            TriageError::ConfigError(
                "No model API key: set classification.api_key or GEMINI_API_KEY".to_string(),
            )
        })
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
