//! Configuration management for the twstock screener.
//!
//! Configuration lives in a single JSON file at `~/.twstock/config.json`
//! (or the path given with `--config`). Every section is optional and falls
//! back to defaults.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `LINE_USER_ID` → line.user_id
//! - `LINE_CHANNEL_ACCESS_TOKEN` → line.channel_access_token
//! - `OPENAI_API_KEY` → llm.api_key
//! - `OPENAI_BASE_URL` → llm.base_url
//! - `OPENAI_MODEL` → llm.model
//! - `TWSTOCK_LOG_LEVEL` → observability.log_level

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".twstock"),
        |dirs| dirs.home_dir().join(".twstock"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// LINE Messaging
// ============================================================================

/// LINE Messaging API settings used for push notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// Whether notifications are delivered at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Recipient user ID for push messages
    #[serde(default)]
    pub user_id: Option<String>,

    /// Long-lived channel access token
    #[serde(default)]
    pub channel_access_token: Option<String>,

    /// API base URL (overridable for testing)
    #[serde(default = "default_line_api_base")]
    pub api_base: String,

    /// Maximum characters per text message
    #[serde(default = "default_line_max_chars")]
    pub max_message_chars: usize,

    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_id: None,
            channel_access_token: None,
            api_base: default_line_api_base(),
            max_message_chars: default_line_max_chars(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_line_api_base() -> String {
    "https://api.line.me".into()
}

fn default_line_max_chars() -> usize {
    2000
}

// ============================================================================
// Language Model
// ============================================================================

/// OpenAI-compatible chat completions settings for the narrative summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether narrative summaries are requested
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API key (Bearer token)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL including the version segment, e.g. `https://api.openai.com/v1`
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,

    /// Maximum tokens in the completion
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Number of recent daily snapshots included in the prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout(),
            history_window: default_history_window(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

fn default_llm_temperature() -> f64 {
    1.0
}

fn default_llm_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_history_window() -> usize {
    20
}

// ============================================================================
// Data Source
// ============================================================================

/// Goodinfo data source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Site base URL (overridable for testing)
    #[serde(default = "default_data_base_url")]
    pub base_url: String,

    /// Calendar days of daily history to request
    #[serde(default = "default_history_days")]
    pub history_days: i64,

    /// Minimum delay between two requests to the site, in milliseconds
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Optional Cookie header (the site sometimes requires a session cookie)
    #[serde(default)]
    pub cookie: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_url: default_data_base_url(),
            history_days: default_history_days(),
            request_interval_ms: default_request_interval_ms(),
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
            cookie: None,
        }
    }
}

fn default_data_base_url() -> String {
    "https://goodinfo.tw".into()
}

fn default_history_days() -> i64 {
    365
}

fn default_request_interval_ms() -> u64 {
    1500
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36"
        .into()
}

// ============================================================================
// Screening
// ============================================================================

/// Screening settings for the daily run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScreeningConfig {
    /// Explicit candidate list. When empty the data source's universe is used.
    #[serde(default)]
    pub candidates: Vec<String>,

    /// Threshold overrides keyed by condition name (e.g. `"volume": 3000`)
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,

    /// Condition names removed from the rule set
    #[serde(default)]
    pub disabled_conditions: Vec<String>,
}

// ============================================================================
// Analysis
// ============================================================================

/// Post-screening analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Rule set used to classify a single stock ("default" or "momentum")
    #[serde(default = "default_rule_set")]
    pub rule_set: String,

    /// Request a narrative for every stock that passes the screen
    #[serde(default = "default_true")]
    pub summarize: bool,

    /// Render charts for every stock that passes the screen
    #[serde(default = "default_true")]
    pub render_charts: bool,

    /// Also notify for single-stock analyses classified bearish
    #[serde(default)]
    pub notify_on_bearish: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rule_set: default_rule_set(),
            summarize: true,
            render_charts: true,
            notify_on_bearish: false,
        }
    }
}

fn default_rule_set() -> String {
    "default".into()
}

// ============================================================================
// Charts
// ============================================================================

/// Chart output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Output directory (`~` is expanded)
    #[serde(default = "default_chart_dir")]
    pub output_dir: String,

    /// Image width in pixels
    #[serde(default = "default_chart_width")]
    pub width: u32,

    /// Image height in pixels
    #[serde(default = "default_chart_height")]
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            output_dir: default_chart_dir(),
            width: default_chart_width(),
            height: default_chart_height(),
        }
    }
}

impl ChartConfig {
    /// Output directory with `~` expanded.
    pub fn resolved_output_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output_dir).into_owned())
    }
}

fn default_chart_dir() -> String {
    "~/.twstock/charts".into()
}

fn default_chart_width() -> u32 {
    1200
}

fn default_chart_height() -> u32 {
    600
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    30
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub line: LineConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub screening: ScreeningConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub charts: ChartConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (explicit path or default) and apply environment overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using an arbitrary variable lookup.
    ///
    /// Empty values are ignored so that `FOO=` does not blank out a file value.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(user_id) = get("LINE_USER_ID") {
            self.line.user_id = Some(user_id);
        }
        if let Some(token) = get("LINE_CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = Some(token);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(level) = get("TWSTOCK_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }

    /// LINE access token, if configured and non-empty.
    pub fn line_access_token(&self) -> Option<&str> {
        non_empty(self.line.channel_access_token.as_deref())
    }

    /// LINE recipient, if configured and non-empty.
    pub fn line_user_id(&self) -> Option<&str> {
        non_empty(self.line.user_id.as_deref())
    }

    /// LLM API key, if configured and non-empty.
    pub fn llm_api_key(&self) -> Option<&str> {
        non_empty(self.llm.api_key.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.line.enabled);
        assert_eq!(config.line.max_message_chars, 2000);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.data.history_days, 365);
        assert_eq!(config.analysis.rule_set, "default");
        assert!(config.screening.candidates.is_empty());
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{ "screening": { "thresholds": { "volume": 3000 } } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.screening.thresholds.get("volume"), Some(&3000.0));
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert!(config.analysis.render_charts);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "line": { "user_id": "U123" }, "observability": { "level": "debug" } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.line_user_id(), Some("U123"));
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LINE_USER_ID", "U999"),
            ("LINE_CHANNEL_ACCESS_TOKEN", "token"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_BASE_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.line_user_id(), Some("U999"));
        assert_eq!(config.line_access_token(), Some("token"));
        assert_eq!(config.llm_api_key(), Some("sk-test"));
        assert_eq!(config.llm.model, "gpt-4o");
        // Empty value leaves the default in place
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_blank_secret_is_absent() {
        let mut config = Config::default();
        config.llm.api_key = Some("   ".into());
        assert!(config.llm_api_key().is_none());
    }

    #[test]
    fn test_chart_dir_expansion() {
        let charts = ChartConfig {
            output_dir: "/tmp/twstock-charts".into(),
            ..ChartConfig::default()
        };
        assert_eq!(charts.resolved_output_dir(), PathBuf::from("/tmp/twstock-charts"));
    }
}
