//! factex-llm - LLM-backed extraction and verification
//!
//! The extractor turns a chunk into zero or more candidate statements; the
//! verifier decides each candidate against its source context. Both are
//! stateless over an injected [`factex_core::LlmClient`]; retry and backoff
//! live in the pipeline coordinator.

mod client;
mod extractor;
mod prompts;
pub mod testing;
mod verifier;

pub use client::ChatCompletionsClient;
pub use extractor::{parse_candidates, FactExtractor};
pub use prompts::PromptTemplates;
pub use verifier::{parse_verdict, FactVerifier};
