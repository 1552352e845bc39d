//! factex-core - Core types and traits for the fact extraction system
//!
//! This crate provides the foundational types, trait contracts, error
//! handling, hashing, and configuration used throughout the factex
//! workspace.

pub mod config;
pub mod error;
pub mod hash;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{FactexError, LlmError, Result};
pub use traits::*;
pub use types::*;
