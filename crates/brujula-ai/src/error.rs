//! Error types for the agent core

use thiserror::Error;

/// Agent core error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{provider} HTTP {status}: {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    /// An orchestrator invariant was broken. Signals a bug, never retried.
    #[error("Contract violation: {0}")]
    Contract(String),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::LlmHttp { status, .. } => {
                *status == 429 || *status == 408 || (500..=599).contains(status)
            }
            AiError::Llm(message) => {
                let lower = message.to_ascii_lowercase();
                lower.contains("rate limit")
                    || lower.contains("timeout")
                    || lower.contains("overloaded")
            }
            AiError::Http(error) => error.is_timeout() || error.is_connect(),
            _ => false,
        }
    }

    /// Server-requested retry delay, when the provider sent one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AiError::LlmHttp {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AiError>;
