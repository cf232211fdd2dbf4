//! Error types for the collaborators and the single-stock workflow.

use thiserror::Error;

use crate::data::ProviderError;
use crate::indicators::IndicatorError;
use crate::screener::RuleSetError;

/// Failure of an external collaborator (language model, chart renderer,
/// messaging). Logged by the orchestrator; never aborts a run.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Rate limit or exhausted quota (HTTP 429)
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Rejected credentials (HTTP 401/403)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport failure or any other non-success status
    #[error("request failed: {0}")]
    Request(String),

    /// Success status with a body we cannot use
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollaboratorError {
    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, body);
        match status {
            429 => Self::Quota(detail),
            401 | 403 => Self::Auth(detail),
            _ => Self::Request(detail),
        }
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// Errors that end a workflow run.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("failed to fetch data: {0}")]
    Fetch(#[from] ProviderError),

    #[error(transparent)]
    InsufficientData(#[from] IndicatorError),

    #[error(transparent)]
    RuleSet(#[from] RuleSetError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AnalyzerError {
    /// Whether the failure came from the data source.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
