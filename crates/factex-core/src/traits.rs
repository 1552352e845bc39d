//! Trait contracts for the external collaborators the core consumes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LlmError, Result};

/// A completion-capable LLM provider.
///
/// Implementations map provider failures onto the typed [`LlmError`] kinds;
/// the pipeline coordinator decides retry-vs-fail per kind and never
/// inspects provider-specific payloads.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run a single completion. The call must not outlive `timeout`;
    /// overruns surface as [`LlmError::Timeout`].
    async fn complete(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> std::result::Result<String, LlmError>;
}

/// A sentence embedding model.
///
/// Must be deterministic for a fixed input within a process; the vector
/// index relies on this when re-embedding edited statements.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. Output order matches input order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embedding dimension.
    fn dimension(&self) -> usize;
}

/// Reads a document from disk into UTF-8 text.
///
/// Format-specific readers (PDF, word-processor) live outside the core; the
/// pipeline only ever sees the `(text, detected_name)` pair.
pub trait DocumentReader: Send + Sync {
    /// Returns the extracted text and a display name derived from the path.
    fn read(&self, path: &Path) -> Result<(String, String)>;
}
