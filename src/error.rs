//! Error types for the financial analysis orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Why a run ended in `Failed`.
///
/// Every failure is resolved inside the orchestrator; callers see one of these
/// on the final state instead of an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Every metrics provider answered, none with usable content.
    ProviderEmpty,
    /// The last metrics provider failed at transport level or timed out.
    ProviderError,
    /// Symbol lookup produced nothing. There is no fallback for it.
    ResolutionFailure,
    /// The model never produced an analysis with all required fields.
    SynthesisMalformed,
    /// Report generation failed on every allowed attempt.
    ReportFailure,
    /// The step bound was reached before the router terminated.
    BoundExceeded,
    Cancelled,
    /// A node returned an internal error.
    NodeFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::ProviderEmpty => "ProviderEmpty",
            FailureKind::ProviderError => "ProviderError",
            FailureKind::ResolutionFailure => "ResolutionFailure",
            FailureKind::SynthesisMalformed => "SynthesisMalformed",
            FailureKind::ReportFailure => "ReportFailure",
            FailureKind::BoundExceeded => "BoundExceeded",
            FailureKind::Cancelled => "Cancelled",
            FailureKind::NodeFailure => "NodeFailure",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_display_matches_variant_name() {
        assert_eq!(FailureKind::ResolutionFailure.to_string(), "ResolutionFailure");
        assert_eq!(FailureKind::BoundExceeded.to_string(), "BoundExceeded");
        let json = serde_json::to_string(&FailureKind::ReportFailure).unwrap();
        assert_eq!(json, "\"ReportFailure\"");
    }
}
