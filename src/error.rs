//! Error types for the article generation pipeline.

use crate::types::ValidationIssue;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for pipeline operations
#[derive(Debug, Error)]
pub enum Error {
    /// Draft still blocked after the regeneration attempt
    #[error("Draft validation failed: {}", summarize(.issues))]
    DraftValidationFailed { issues: Vec<ValidationIssue> },

    /// A later validation gate stayed blocked after reverting to gated content
    #[error("Content blocked at {stage}: {}", summarize(.issues))]
    ContentBlocked {
        stage: String,
        issues: Vec<ValidationIssue>,
    },

    /// External provider returned an error
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    /// External provider call exceeded its deadline
    #[error("Provider timeout ({provider}) after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    /// Pipeline cancelled between stages
    #[error("Cancelled before stage: {stage}")]
    Cancelled { stage: String },

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a retry of the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Provider { .. } => true,
            // 検証エラー・設定エラーはリトライしない
            _ => false,
        }
    }

    /// Whether this error came out of a blocking validation gate
    pub fn is_blocking_validation(&self) -> bool {
        matches!(
            self,
            Error::DraftValidationFailed { .. } | Error::ContentBlocked { .. }
        )
    }

    /// Blocking issues carried by a validation failure
    pub fn blocking_issues(&self) -> &[ValidationIssue] {
        match self {
            Error::DraftValidationFailed { issues } | Error::ContentBlocked { issues, .. } => {
                issues
            }
            _ => &[],
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

fn summarize(issues: &[ValidationIssue]) -> String {
    if issues.is_empty() {
        return "no issues recorded".to_string();
    }
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.issue_type.as_str(), issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}
