//! Error types for the distillation pipeline

use thiserror::Error;

/// Result type alias for distillation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Distillation pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document has no text to process
    #[error("Document '{0}' has no content")]
    EmptyDocument(String),

    /// Collaborator (LLM) call failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// A single collaborator call exceeded its timeout
    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    /// Collaborator answered, but not with the expected structure
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    /// A fatal failure in a stage past chunk analysis
    #[error("{stage} failed: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },

    /// Relevance filtering kept nothing
    #[error("No section of the document is relevant to the goal: {0}")]
    NoRelevantContent(String),

    /// A token checkpoint was exceeded
    #[error(
        "Document too large even after filtering ({checkpoint}: ~{estimated_tokens} tokens, limit {limit}). Try a smaller file."
    )]
    BudgetExceeded {
        checkpoint: &'static str,
        estimated_tokens: usize,
        limit: usize,
    },

    /// Processing was cancelled by the caller
    #[error("Processing cancelled")]
    Cancelled,

    /// Cache error (never surfaced by the pipeline, only logged)
    #[error("Cache error: {0}")]
    Cache(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Wrap an error as fatal for the named stage
    pub fn stage(stage: &'static str, err: Error) -> Self {
        match err {
            // Keep these variants intact so callers can match on them
            Error::Cancelled | Error::BudgetExceeded { .. } | Error::Stage { .. } => err,
            other => Self::Stage {
                stage,
                message: other.to_string(),
            },
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the failure carries an HTTP 429 / rate-limit signal
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::Llm(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("429")
                    || lower.contains("rate limit")
                    || lower.contains("rate-limit")
            }
            Error::Http(err) => err.status().map(|s| s.as_u16() == 429).unwrap_or(false),
            _ => false,
        }
    }

    /// Whether the failure is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Cancelled
            | Error::Config(_)
            | Error::EmptyDocument(_)
            | Error::BudgetExceeded { .. } => false,
            Error::Http(err) => !err
                .status()
                .map(|s| s.is_client_error() && s.as_u16() != 429)
                .unwrap_or(false),
            _ => true,
        }
    }
}
