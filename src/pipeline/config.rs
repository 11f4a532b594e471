//! Declarative pipeline configuration.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. explicit path (`--config <path>`)
//! 2. `~/.muninn/pipeline.toml` (user)
//! 3. `/etc/muninn/pipeline.toml` (system)
//! 4. built-in defaults (every section disabled)
//!
//! Every section carries an `enabled` flag and a missing section is
//! disabled, so an empty file yields a pass-through pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::middleware::{DefaultSettings, LoggingConfig, ReasoningConfig};
use crate::reasoning::DEFAULT_TAG;
use crate::retry::RetryConfig;
use crate::{MuninnError, Result};

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub caching: CachingSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub reasoning: ReasoningSection,
    #[serde(default)]
    pub simulation: SimulationSection,
    /// Settings injected into calls that leave them unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_settings: Option<DefaultSettings>,
    #[serde(default)]
    pub context_injection: ContextInjectionSection,
    #[serde(default)]
    pub content_filtering: ContentFilteringSection,
    #[serde(default)]
    pub error_handling: ErrorHandlingSection,
}

/// `[caching]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachingSection {
    #[serde(default)]
    pub enabled: bool,
    /// Entry lifetime in seconds (default: 3600).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum number of entries (default: 1000).
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Delay before the first replayed event, in milliseconds (default: 0).
    #[serde(default)]
    pub replay_initial_delay_ms: u64,
    /// Delay between replayed events, in milliseconds (default: 0).
    #[serde(default)]
    pub replay_chunk_delay_ms: u64,
    /// Store streams that ended in a non-retryable error (default: true).
    #[serde(default = "default_true")]
    pub cache_errors: bool,
}

impl Default for CachingSection {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_ttl_secs(),
            max_size: default_max_size(),
            replay_initial_delay_ms: 0,
            replay_chunk_delay_ms: 0,
            cache_errors: true,
        }
    }
}

impl CachingSection {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.max_size)
            .ttl(Duration::from_secs(self.ttl_secs))
            .replay_delays(
                Duration::from_millis(self.replay_initial_delay_ms),
                Duration::from_millis(self.replay_chunk_delay_ms),
            )
            .cache_errors(self.cache_errors)
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_size() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

/// `[logging]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub log_params: bool,
    #[serde(default)]
    pub log_results: bool,
}

impl LoggingSection {
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::new()
            .log_params(self.log_params)
            .log_results(self.log_results)
    }
}

/// `[reasoning]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningSection {
    #[serde(default)]
    pub enabled: bool,
    /// Tag name without brackets (default: `think`).
    #[serde(default = "default_tag_name")]
    pub tag_name: String,
    #[serde(default)]
    pub start_with_reasoning: bool,
}

impl Default for ReasoningSection {
    fn default() -> Self {
        Self {
            enabled: false,
            tag_name: default_tag_name(),
            start_with_reasoning: false,
        }
    }
}

impl ReasoningSection {
    pub fn reasoning_config(&self) -> ReasoningConfig {
        ReasoningConfig::new()
            .tag_name(self.tag_name.clone())
            .start_with_reasoning(self.start_with_reasoning)
    }
}

fn default_tag_name() -> String {
    DEFAULT_TAG.to_string()
}

/// `[simulation]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSection {
    #[serde(default)]
    pub enabled: bool,
}

/// `[context_injection]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInjectionSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub context: String,
}

/// `[content_filtering]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilteringSection {
    #[serde(default)]
    pub enabled: bool,
    /// Regular expressions, applied in order.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Replacement for the pattern at the same index (default: `***`).
    #[serde(default)]
    pub replacements: Vec<String>,
}

/// Where rate-limit retries happen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryScope {
    /// Around the model call; streams and generate alike.
    #[default]
    Model,
    /// Around the whole request/response exchange; generate only.
    Conversation,
}

/// `[error_handling]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHandlingSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub retry_on_rate_limit: bool,
    /// Retries after the first failure (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds, doubled each time (default: 500).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub scope: RetryScope,
}

impl Default for ErrorHandlingSection {
    fn default() -> Self {
        Self {
            enabled: false,
            retry_on_rate_limit: true,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            scope: RetryScope::Model,
        }
    }
}

impl ErrorHandlingSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.max_retries.saturating_add(1))
            .base_delay(Duration::from_millis(self.retry_delay_ms))
            .retry_on_rate_limit(self.retry_on_rate_limit)
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl PipelineConfig {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the first of
    /// `~/.muninn/pipeline.toml` and `/etc/muninn/pipeline.toml` that exists
    /// is used; if neither does, the defaults are returned.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MuninnError::Configuration(format!("Failed to parse config: {e}")))
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MuninnError::Configuration(format!("Failed to render config: {e}")))
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MuninnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MuninnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".muninn").join("pipeline.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/muninn/pipeline.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_disables_everything() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(!config.caching.enabled);
        assert!(!config.error_handling.enabled);
        assert!(config.default_settings.is_none());
    }

    #[test]
    fn section_defaults_fill_missing_fields() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [caching]
            enabled = true

            [reasoning]
            enabled = true
        "#,
        )
        .unwrap();
        assert_eq!(config.caching.ttl_secs, 3600);
        assert_eq!(config.caching.max_size, 1000);
        assert!(config.caching.cache_errors);
        assert_eq!(config.reasoning.tag_name, "think");
    }

    #[test]
    fn error_handling_maps_to_retry_config() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [error_handling]
            enabled = true
            max_retries = 4
            retry_delay_ms = 250
            retry_on_rate_limit = false
            scope = "conversation"
        "#,
        )
        .unwrap();
        let retry = config.error_handling.retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.base_delay, Duration::from_millis(250));
        assert!(!retry.retry_on_rate_limit);
        assert_eq!(config.error_handling.scope, RetryScope::Conversation);
    }

    #[test]
    fn default_settings_with_provider_metadata() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [default_settings]
            temperature = 0.3

            [default_settings.provider_metadata.openai]
            user = "svc"
        "#,
        )
        .unwrap();
        let defaults = config.default_settings.unwrap();
        assert_eq!(defaults.temperature, Some(0.3));
        assert_eq!(
            defaults.provider_metadata,
            Some(serde_json::json!({"openai": {"user": "svc"}}))
        );
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let err = PipelineConfig::from_toml_str("[error_handling]\nscope = \"global\"").unwrap_err();
        assert!(matches!(err, MuninnError::Configuration(_)));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/pipeline.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
