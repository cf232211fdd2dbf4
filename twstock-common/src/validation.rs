//! Configuration validation.
//!
//! Structural checks run for every invocation; secret checks depend on which
//! features the run actually uses (see [`RunFeatures`]).

use thiserror::Error;

use crate::config::{
    AnalysisConfig, ChartConfig, Config, DataConfig, LineConfig, LlmConfig, ObservabilityConfig,
};

/// Rule set names accepted by `analysis.rule_set` and `--rules`.
pub const RULE_SET_NAMES: &[&str] = &["default", "momentum"];

/// Largest accepted `data.history_days`, ten years.
pub const MAX_HISTORY_DAYS: i64 = 3650;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Features a particular run will exercise.
///
/// Secrets are only required for the features that are switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFeatures {
    /// Push notifications will be delivered
    pub notify: bool,
    /// Narrative summaries will be requested
    pub summarize: bool,
}

impl RunFeatures {
    /// Derive the feature set from config plus CLI suppression flags.
    pub fn resolve(config: &Config, no_notification: bool, no_summary: bool) -> Self {
        Self {
            notify: config.line.enabled && !no_notification,
            summarize: config.llm.enabled && config.analysis.summarize && !no_summary,
        }
    }
}

impl Config {
    /// Validate structural settings of the whole configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let results = [
            self.line.validate(),
            self.llm.validate(),
            self.data.validate(),
            self.analysis.validate(),
            self.charts.validate(),
            self.observability.validate(),
        ];

        collect(results.into_iter().filter_map(Result::err).collect())
    }

    /// Validate structure plus the secrets required by `features`.
    pub fn validate_for(&self, features: RunFeatures) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.validate() {
            match e {
                ValidationError::Multiple(inner) => errors.extend(inner),
                other => errors.push(other),
            }
        }

        if features.notify {
            if self.line_access_token().is_none() {
                errors.push(ValidationError::MissingField {
                    field: "line.channel_access_token (LINE_CHANNEL_ACCESS_TOKEN)".into(),
                });
            }
            if self.line_user_id().is_none() {
                errors.push(ValidationError::MissingField {
                    field: "line.user_id (LINE_USER_ID)".into(),
                });
            }
        }

        if features.summarize && self.llm_api_key().is_none() {
            errors.push(ValidationError::MissingField {
                field: "llm.api_key (OPENAI_API_KEY)".into(),
            });
        }

        collect(errors)
    }
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

impl Validate for LineConfig {
    fn validate(&self) -> ValidationResult<()> {
        // LINE rejects text messages longer than 5000 characters
        if self.max_message_chars == 0 || self.max_message_chars > 5000 {
            return Err(ValidationError::InvalidValue {
                field: "line.max_message_chars".into(),
                reason: "must be between 1 and 5000".into(),
            });
        }

        if !self.api_base.starts_with("http") {
            return Err(ValidationError::InvalidValue {
                field: "line.api_base".into(),
                reason: format!("not an http(s) URL: {}", self.api_base),
            });
        }

        Ok(())
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidValue {
                field: "llm.temperature".into(),
                reason: "must be between 0.0 and 2.0".into(),
            });
        }

        if self.max_tokens == 0 {
            return Err(ValidationError::InvalidValue {
                field: "llm.max_tokens".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "llm.model".into(),
            });
        }

        Ok(())
    }
}

impl Validate for DataConfig {
    fn validate(&self) -> ValidationResult<()> {
        // ma60 needs at least 60 trading days, roughly 90 calendar days
        if !(90..=MAX_HISTORY_DAYS).contains(&self.history_days) {
            return Err(ValidationError::InvalidValue {
                field: "data.history_days".into(),
                reason: format!("must be between 90 and {}", MAX_HISTORY_DAYS),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "data.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

impl Validate for AnalysisConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !RULE_SET_NAMES.contains(&self.rule_set.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "analysis.rule_set".into(),
                reason: format!("must be one of: {}", RULE_SET_NAMES.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for ChartConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.width < 200 || self.height < 200 {
            return Err(ValidationError::InvalidValue {
                field: "charts.width/charts.height".into(),
                reason: "must be at least 200 pixels".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_features() -> RunFeatures {
        RunFeatures {
            notify: true,
            summarize: true,
        }
    }

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config
            .validate_for(RunFeatures {
                notify: false,
                summarize: false
            })
            .is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "verbose".into();
        match config.validate() {
            Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "observability.log_level");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_rule_set() {
        let mut config = Config::default();
        config.analysis.rule_set = "aggressive".into();
        assert!(config.validate().is_err());

        config.analysis.rule_set = "Momentum".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_llm_key() {
        let config = Config::default();
        let features = RunFeatures {
            notify: false,
            summarize: true,
        };
        match config.validate_for(features) {
            Err(ValidationError::MissingField { field }) => {
                assert!(field.starts_with("llm.api_key"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_missing_line_secrets_collected() {
        let config = Config::default();
        match config.validate_for(all_features()) {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_all_secrets_present() {
        let mut config = Config::default();
        config.line.user_id = Some("U123".into());
        config.line.channel_access_token = Some("token".into());
        config.llm.api_key = Some("sk-test".into());
        assert!(config.validate_for(all_features()).is_ok());
    }

    #[test]
    fn test_resolve_features() {
        let mut config = Config::default();
        let features = RunFeatures::resolve(&config, true, false);
        assert!(!features.notify);
        assert!(features.summarize);

        config.llm.enabled = false;
        let features = RunFeatures::resolve(&config, false, false);
        assert!(features.notify);
        assert!(!features.summarize);
    }

    #[test]
    fn test_history_days_bounds() {
        let mut config = Config::default();
        config.data.history_days = 100_000_000;
        match config.validate() {
            Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "data.history_days");
            }
            other => panic!("unexpected: {other:?}"),
        }

        config.data.history_days = 30;
        assert!(config.validate().is_err());

        config.data.history_days = MAX_HISTORY_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_line_message_limit() {
        let mut config = Config::default();
        config.line.max_message_chars = 6000;
        assert!(config.validate().is_err());
    }
}
