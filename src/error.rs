//! Shared error types for the repair harness.
//!
//! Subsystems with purely local failure modes (verifier, repair loop,
//! artifact store) define their error enums next to their code; the enums
//! here are the ones that cross module boundaries.

use thiserror::Error;

/// Errors from the LLM provider boundary.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error {code}: {message}")]
    ApiError { code: u16, message: String },
}

/// Errors from dataset loading and persistence.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Invalid record at line {line}: {message}")]
    InvalidRecord { line: usize, message: String },

    #[error("Dataset is empty: {0}")]
    Empty(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
