//! factex-store - Tabular persistence for facts and chunks
//!
//! Three CSV-backed stores, one mutex each: verified facts, rejected facts,
//! and chunks with their extraction-progress flags. Every mutation flushes
//! through an atomic temp-file rename so a crash never leaves a
//! half-written artifact; on restart the loaders pick up exactly the
//! committed rows.

mod chunks;
mod facts;
mod table;

pub use chunks::{ChunkStore, StatusUpdate};
pub use facts::{FactStore, FactTable, RejectedFactStore, StoreOutcome};
