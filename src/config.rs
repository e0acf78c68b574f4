// Configuration File Support
//
// This module provides configuration file parsing for the preapproval relay.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from the XDG config directory:
// ~/.config/preapproval-relay/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::webhooks::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP listener configuration
    pub server: ServerConfig,

    /// Webhook destinations and delivery policy
    pub webhooks: WebhooksConfig,

    /// Lead engagement rate limiting
    pub lead_tracking: LeadTrackingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebhooksConfig {
    /// Destination for lead engagement events
    pub lead_in_url: Option<String>,

    /// Destination for application completion events
    pub completion_url: Option<String>,

    /// Log envelopes instead of sending them
    pub dry_run: bool,

    /// Per-attempt request timeout in seconds
    pub timeout_secs: u64,

    /// Total attempts per delivery
    pub max_attempts: u32,

    /// Backoff base; the delay after attempt n is base * 2^n
    pub base_delay_ms: u64,

    /// Add ±20% jitter to backoff delays
    pub jitter: bool,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            lead_in_url: None,
            completion_url: None,
            dry_run: false,
            timeout_secs: retry.attempt_timeout_secs,
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay_ms,
            jitter: retry.use_jitter,
        }
    }
}

impl WebhooksConfig {
    /// Retry policy derived from this configuration
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            attempt_timeout_secs: self.timeout_secs,
            use_jitter: self.jitter,
            ..RetryConfig::default()
        }
    }

    /// Lead destination, ignoring blank values
    pub fn lead_in_url(&self) -> Option<&str> {
        non_blank(self.lead_in_url.as_deref())
    }

    /// Completion destination, ignoring blank values
    pub fn completion_url(&self) -> Option<&str> {
        non_blank(self.completion_url.as_deref())
    }
}

/// Lead tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeadTrackingConfig {
    /// Forward lead engagement events at all
    pub enabled: bool,

    /// Minimum seconds between forwarded events per client
    pub cooldown_secs: u64,

    /// How often expired entries are purged; 0 disables the sweeper
    pub sweep_interval_secs: u64,
}

impl Default for LeadTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 600,
            sweep_interval_secs: 3600,
        }
    }
}

impl LeadTrackingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve /metrics on the intake listener
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// Environment overrides are applied whether or not the file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the resulting configuration fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/preapproval-relay/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "preapproval", "preapproval-relay") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("preapproval-relay")
                .join("config.toml")
        }
    }

    /// Apply process environment overrides
    ///
    /// Environment variables take precedence over config file values:
    /// - PREAPPROVAL_LOG_LEVEL / PREAPPROVAL_LOG_FORMAT
    /// - PREAPPROVAL_HOST / PREAPPROVAL_PORT
    /// - PREAPPROVAL_LEAD_IN_WEBHOOK_URL / PREAPPROVAL_COMPLETION_WEBHOOK_URL
    /// - PREAPPROVAL_WEBHOOK_DRY_RUN / PREAPPROVAL_WEBHOOK_TIMEOUT_SECS
    /// - PREAPPROVAL_LEAD_TRACKING_ENABLED / PREAPPROVAL_LEAD_COOLDOWN_SECS
    /// - PREAPPROVAL_METRICS_ENABLED
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// Unparseable values are ignored and the existing value is kept.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("PREAPPROVAL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("PREAPPROVAL_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(host) = lookup("PREAPPROVAL_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PREAPPROVAL_PORT").and_then(|p| p.parse::<u16>().ok()) {
            if port > 0 {
                self.server.port = port;
            }
        }

        if let Some(url) = lookup("PREAPPROVAL_LEAD_IN_WEBHOOK_URL") {
            self.webhooks.lead_in_url = non_blank(Some(url.as_str())).map(str::to_string);
        }
        if let Some(url) = lookup("PREAPPROVAL_COMPLETION_WEBHOOK_URL") {
            self.webhooks.completion_url = non_blank(Some(url.as_str())).map(str::to_string);
        }
        if let Some(dry_run) = lookup("PREAPPROVAL_WEBHOOK_DRY_RUN").and_then(|v| parse_flag(&v)) {
            self.webhooks.dry_run = dry_run;
        }
        if let Some(timeout) = lookup("PREAPPROVAL_WEBHOOK_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if timeout > 0 {
                self.webhooks.timeout_secs = timeout;
            }
        }

        if let Some(enabled) = lookup("PREAPPROVAL_LEAD_TRACKING_ENABLED").and_then(|v| parse_flag(&v)) {
            self.lead_tracking.enabled = enabled;
        }
        if let Some(cooldown) = lookup("PREAPPROVAL_LEAD_COOLDOWN_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if cooldown > 0 {
                self.lead_tracking.cooldown_secs = cooldown;
            }
        }

        if let Some(enabled) = lookup("PREAPPROVAL_METRICS_ENABLED").and_then(|v| parse_flag(&v)) {
            self.metrics.enabled = enabled;
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        if self.webhooks.max_attempts == 0 {
            anyhow::bail!("Webhook max_attempts must be > 0");
        }
        if self.webhooks.timeout_secs == 0 {
            anyhow::bail!("Webhook timeout_secs must be > 0");
        }
        for (name, url) in [
            ("lead_in_url", self.webhooks.lead_in_url()),
            ("completion_url", self.webhooks.completion_url()),
        ] {
            if let Some(url) = url {
                validate_webhook_url(name, url)?;
            }
        }

        if self.lead_tracking.cooldown_secs == 0 {
            anyhow::bail!("Lead tracking cooldown_secs must be > 0");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

fn validate_webhook_url(name: &str, url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .with_context(|| format!("Webhook {} is not a valid URL: {}", name, url))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => anyhow::bail!("Webhook {} must use http or https, got '{}'", name, scheme),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a boolean-like flag (`1/0`, `true/false`, `yes/no`, `on/off`)
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.webhooks.max_attempts, 3);
        assert_eq!(config.webhooks.timeout_secs, 10);
        assert!(!config.webhooks.dry_run);
        assert_eq!(config.lead_tracking.cooldown(), Duration::from_secs(600));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_attempts_and_timeout() {
        let mut config = Config::default();
        config.webhooks.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.webhooks.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_webhook_urls() {
        let mut config = Config::default();
        config.webhooks.completion_url = Some("ftp://hooks.example.com".to_string());
        assert!(config.validate().is_err());

        config.webhooks.completion_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.webhooks.completion_url = Some("https://hooks.example.com/complete".to_string());
        assert!(config.validate().is_ok());

        // Blank means unset, not invalid
        config.webhooks.lead_in_url = Some("   ".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.webhooks.lead_in_url(), None);
    }

    #[test]
    fn test_config_validation_invalid_cooldown() {
        let mut config = Config::default();
        config.lead_tracking.cooldown_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("nonexistent");
        let config = Config::load_from_path(&path);
        assert!(config.is_ok());
    }

    #[test]
    fn test_load_valid_toml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging]
level = "debug"
format = "json"

[server]
host = "127.0.0.1"
port = 9000

[webhooks]
lead_in_url = "https://hooks.example.com/lead"
completion_url = "https://hooks.example.com/complete"
dry_run = true
timeout_secs = 5

[lead_tracking]
cooldown_secs = 120
sweep_interval_secs = 0
"#;

        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.webhooks.lead_in_url(), Some("https://hooks.example.com/lead"));
        assert_eq!(config.webhooks.timeout_secs, 5);
        assert_eq!(config.lead_tracking.cooldown_secs, 120);
        assert_eq!(config.lead_tracking.sweep_interval(), None);
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging
level = "debug"
"#;

        fs::write(temp_file.path(), toml_content).unwrap();
        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[webhooks]\nmax_attempts = 0\n").unwrap();
        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_config_partial_toml() {
        let config: Config = toml::from_str("[webhooks]\ndry_run = true\n").unwrap();
        assert!(config.webhooks.dry_run);
        assert_eq!(config.webhooks.max_attempts, 3);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_overrides() {
        let config = Config::default().apply_overrides(overrides(&[
            ("PREAPPROVAL_LOG_LEVEL", "debug"),
            ("PREAPPROVAL_PORT", "9001"),
            ("PREAPPROVAL_LEAD_IN_WEBHOOK_URL", "https://hooks.example.com/lead"),
            ("PREAPPROVAL_COMPLETION_WEBHOOK_URL", "https://hooks.example.com/done"),
            ("PREAPPROVAL_WEBHOOK_DRY_RUN", "yes"),
            ("PREAPPROVAL_LEAD_COOLDOWN_SECS", "60"),
            ("PREAPPROVAL_METRICS_ENABLED", "off"),
        ]));

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.webhooks.lead_in_url(), Some("https://hooks.example.com/lead"));
        assert_eq!(config.webhooks.completion_url(), Some("https://hooks.example.com/done"));
        assert!(config.webhooks.dry_run);
        assert_eq!(config.lead_tracking.cooldown_secs, 60);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_overrides_invalid_values() {
        let config = Config::default().apply_overrides(overrides(&[
            ("PREAPPROVAL_PORT", "0"),
            ("PREAPPROVAL_WEBHOOK_DRY_RUN", "maybe"),
            ("PREAPPROVAL_WEBHOOK_TIMEOUT_SECS", "soon"),
            ("PREAPPROVAL_LEAD_COOLDOWN_SECS", "0"),
        ]));

        assert_eq!(config.server.port, 8080);
        assert!(!config.webhooks.dry_run);
        assert_eq!(config.webhooks.timeout_secs, 10);
        assert_eq!(config.lead_tracking.cooldown_secs, 600);
    }

    #[test]
    fn test_blank_url_override_clears_destination() {
        let mut config = Config::default();
        config.webhooks.completion_url = Some("https://hooks.example.com/done".to_string());

        let config = config.apply_overrides(overrides(&[("PREAPPROVAL_COMPLETION_WEBHOOK_URL", "")]));
        assert_eq!(config.webhooks.completion_url, None);
    }

    #[test]
    fn test_retry_config_from_webhooks() {
        let mut config = Config::default();
        config.webhooks.max_attempts = 5;
        config.webhooks.base_delay_ms = 250;
        config.webhooks.timeout_secs = 3;

        let retry = config.webhooks.retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.base_delay_ms, 250);
        assert_eq!(retry.attempt_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_flag() {
        for truthy in ["1", "true", "TRUE", "yes", "on", " on "] {
            assert_eq!(parse_flag(truthy), Some(true), "{} should be true", truthy);
        }
        for falsy in ["0", "false", "no", "off"] {
            assert_eq!(parse_flag(falsy), Some(false), "{} should be false", falsy);
        }
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_config_path() {
        assert!(Config::config_path().ends_with("config.toml"));
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);

        config.logging.level = "invalid".to_string();
        assert!(config.log_level().is_err());
    }
}
