//! factex-pipeline - The fact extraction state machine and public API
//!
//! Wires the chunker, extractor, verifier, tabular stores, and vector index
//! into one engine: [`FactEngine::submit`] drives a document through
//! chunking, bounded-concurrency extraction, per-candidate verification,
//! and dual-store commits under the consistency layer.

mod consistency;
mod coordinator;
mod engine;

pub use consistency::{Consistency, PurgeOutcome};
pub use coordinator::PipelineCoordinator;
pub use engine::FactEngine;
