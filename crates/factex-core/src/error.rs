//! Error types for the fact extraction system.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using FactexError.
pub type Result<T> = std::result::Result<T, FactexError>;

/// Typed failures of the LLM collaborator.
///
/// The coordinator decides retry-vs-fail per kind; see
/// [`LlmError::is_retriable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Provider signalled rate limiting (HTTP 429 or equivalent).
    #[error("rate limited by LLM provider")]
    RateLimited,

    /// The call exceeded its per-call timeout.
    #[error("LLM call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Transient provider failure (5xx, connection reset).
    #[error("transient LLM error: {0}")]
    Transient(String),

    /// Permanent failure (bad request, auth, model missing).
    #[error("permanent LLM error: {0}")]
    Permanent(String),
}

impl LlmError {
    /// Whether the coordinator should retry this failure under backoff.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

/// Errors that can occur in the fact extraction system.
#[derive(Error, Debug)]
pub enum FactexError {
    /// Submitted document text is empty after trimming.
    #[error("document text is empty")]
    EmptyInput,

    /// The document reader cannot handle this file format.
    #[error("unsupported document format: {extension}")]
    UnsupportedFormat { extension: String },

    /// The extractor response could not be parsed.
    #[error("malformed extraction response: {message}")]
    ExtractionParse { message: String },

    /// The verifier response could not be parsed.
    #[error("malformed verification response: {message}")]
    VerificationParse { message: String },

    /// A tabular or vector store could not complete an operation.
    /// Retriable by the caller.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// A persisted artifact exists but cannot be read back.
    #[error("corrupt store file {path:?}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// A multi-store mutation left the stores inconsistent and was rolled
    /// back.
    #[error("consistency violation: {message}")]
    ConsistencyViolation { message: String },

    /// No fact with the given id in either store.
    #[error("fact not found: {fact_id}")]
    FactNotFound { fact_id: String },

    /// Embedding model error.
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// Typed LLM failure, surfaced after retries are exhausted.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV (de)serialization error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FactexError {
    /// Create a store-unavailable error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create an extraction parse error.
    pub fn extraction_parse(message: impl Into<String>) -> Self {
        Self::ExtractionParse {
            message: message.into(),
        }
    }

    /// Create a verification parse error.
    pub fn verification_parse(message: impl Into<String>) -> Self {
        Self::VerificationParse {
            message: message.into(),
        }
    }

    /// Create a consistency violation error.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_kinds() {
        assert!(LlmError::RateLimited.is_retriable());
        assert!(LlmError::Timeout { seconds: 60 }.is_retriable());
        assert!(LlmError::Transient("502".into()).is_retriable());
        assert!(!LlmError::Permanent("bad key".into()).is_retriable());
    }

    #[test]
    fn error_display() {
        let err = FactexError::FactNotFound {
            fact_id: "fact-01".into(),
        };
        assert!(err.to_string().contains("fact-01"));
    }
}
