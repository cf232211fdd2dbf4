//! twstock Common - Shared configuration, validation, errors and logging.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.twstock/config.json` + environment)
//! - Configuration validation, including required secrets per enabled feature
//! - Error types shared by the screener service
//! - Logging setup with noisy-module suppression
//! - Small string utilities used when building messages and log lines

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    AnalysisConfig, ChartConfig, Config, DataConfig, LineConfig, LlmConfig, ObservabilityConfig,
    ScreeningConfig,
};
pub use error::{Error, Result};
pub use validation::{RunFeatures, Validate, ValidationError, ValidationResult};
