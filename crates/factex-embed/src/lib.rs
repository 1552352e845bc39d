//! factex-embed - Sentence embedding implementations
//!
//! ONNX Runtime inference over MiniLM-class sentence transformers for
//! production, and a deterministic hash-based mock for tests. Both
//! implement [`factex_core::Embedder`].

mod mock;
mod onnx;

pub use mock::MockEmbedder;
pub use onnx::OnnxEmbedder;

pub use factex_core::Embedder;
