//! Shared types and errors for the sigforge signal pipeline.
//!
//! This crate provides the foundational types used across all other sigforge crates:
//! - `SignalError`: unified error taxonomy
//! - `StageFailure` / `SchemaViolation`: typed stage-level failures
//! - `Stage`: the named completion stages
//! - signal entities (`SignalRequest`, `ProposedSignal`, `ValidationOutcome`, ...)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod signal;

pub use signal::*;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One discrete request/response interaction with the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Generate,
    Validate,
    Summarize,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Generate, Stage::Validate, Stage::Summarize];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Validate => "validate",
            Stage::Summarize => "summarize",
        }
    }

    /// Name of the structured-output contract sent to the completion service.
    pub fn contract_name(&self) -> &'static str {
        match self {
            Stage::Generate => "generate_trading_signal",
            Stage::Validate => "validate_trading_signal",
            Stage::Summarize => "summarize_trading_signal",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generate" => Ok(Stage::Generate),
            "validate" => Ok(Stage::Validate),
            "summarize" => Ok(Stage::Summarize),
            other => Err(SignalError::Other(format!("Unknown stage '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// SchemaViolation / StageFailure
// ---------------------------------------------------------------------------

/// The first field of a candidate object that failed its schema constraint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field '{path}' violates schema: expected {expected}")]
pub struct SchemaViolation {
    /// Dotted field path, `$` for the document root.
    pub path: String,
    pub expected: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
        }
    }
}

/// Why a single stage invocation could not produce a typed output.
#[derive(Debug, thiserror::Error)]
pub enum FailureCause {
    #[error("completion call failed: {0}")]
    Completion(#[source] Box<SignalError>),

    #[error("completion service returned no content")]
    EmptyResponse,

    #[error("response is not valid JSON: {0}")]
    MalformedOutput(String),

    #[error(transparent)]
    Schema(#[from] SchemaViolation),
}

#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed: {cause}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub cause: FailureCause,
}

impl StageFailure {
    pub fn new(stage: Stage, cause: impl Into<FailureCause>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    pub fn schema_violation(&self) -> Option<&SchemaViolation> {
        match &self.cause {
            FailureCause::Schema(v) => Some(v),
            _ => None,
        }
    }
}

impl From<SignalError> for FailureCause {
    fn from(err: SignalError) -> Self {
        FailureCause::Completion(Box::new(err))
    }
}

// ---------------------------------------------------------------------------
// SignalError
// ---------------------------------------------------------------------------

/// Unified error type for all sigforge subsystems.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    // === Completion Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out")]
    RequestTimeout { provider: String },

    // === Pipeline Errors ===
    #[error("Invalid signal request: {0}")]
    InvalidRequest(String),

    #[error("Signal generation failed: {0}")]
    GenerationFailed(#[source] StageFailure),

    #[error("Signal validation failed: {0}")]
    ValidationFailed(#[source] StageFailure),

    #[error("Signal summarization failed: {0}")]
    SummarizationFailed(#[source] StageFailure),

    // === Notification Errors ===
    #[error("Notifier '{notifier}' failed: {message}")]
    NotificationFailed { notifier: String, message: String },

    // === Configuration ===
    #[error("Configuration error: {0}")]
    Config(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SignalError {
    /// The stage failure behind a pipeline abort, if this is one.
    pub fn stage_failure(&self) -> Option<&StageFailure> {
        match self {
            SignalError::GenerationFailed(f)
            | SignalError::ValidationFailed(f)
            | SignalError::SummarizationFailed(f) => Some(f),
            _ => None,
        }
    }

    /// Returns `true` if a completion response was rejected by its output schema.
    pub fn is_schema_failure(&self) -> bool {
        self.stage_failure()
            .map(|f| f.schema_violation().is_some())
            .unwrap_or(false)
    }

    /// Message suitable for showing to the person who submitted the request.
    pub fn user_message(&self) -> String {
        if self.is_schema_failure() {
            return "The AI's response was not in the expected format. \
                    Please try adjusting your input or try again later."
                .to_string();
        }
        self.to_string()
    }
}

/// A convenience alias for `Result<T, SignalError>`.
pub type Result<T> = std::result::Result<T, SignalError>;
