//! Configuration types for the fact extraction system.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactexConfig {
    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Pipeline concurrency and retry configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target words per chunk.
    #[serde(default = "default_chunk_size_words")]
    pub chunk_size_words: usize,

    /// Word overlap between consecutive chunks.
    #[serde(default = "default_chunk_overlap_words")]
    pub chunk_overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_words: default_chunk_size_words(),
            chunk_overlap_words: default_chunk_overlap_words(),
        }
    }
}

/// Pipeline concurrency and retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on in-flight chunks.
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    /// Per-LLM-call timeout in seconds.
    #[serde(default = "default_llm_timeout_s")]
    pub llm_timeout_s: u64,

    /// Maximum backoff attempts on retriable LLM errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds.
    #[serde(default = "default_backoff_base_s")]
    pub backoff_base_s: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_chunks: default_max_concurrent_chunks(),
            llm_timeout_s: default_llm_timeout_s(),
            max_retries: default_max_retries(),
            backoff_base_s: default_backoff_base_s(),
        }
    }
}

/// LLM provider configuration (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat-completions API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Identifier of the embedding model.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Directory holding the ONNX model and tokenizer files.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            model_dir: default_model_dir(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the tabular stores and the vector index.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Name of the vector collection.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            collection: default_collection(),
        }
    }
}

// Default value functions

fn default_chunk_size_words() -> usize {
    750
}

fn default_chunk_overlap_words() -> usize {
    50
}

fn default_max_concurrent_chunks() -> usize {
    5
}

fn default_llm_timeout_s() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base_s() -> u64 {
    2
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_llm_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_api_key_env() -> String {
    "FACTEX_API_KEY".to_string()
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_model_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("factex")
        .join("models")
        .join("all-MiniLM-L6-v2")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_collection() -> String {
    "fact_embeddings".to_string()
}

impl FactexConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::FactexError::config(format!("failed to parse config: {}", e))
        })?;
        Ok(config)
    }

    /// Load configuration from default paths: user config dir, then a local
    /// `factex.toml`, then built-in defaults.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("factex").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("factex.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = FactexConfig::default();
        assert_eq!(config.chunking.chunk_size_words, 750);
        assert_eq!(config.chunking.chunk_overlap_words, 50);
        assert_eq!(config.pipeline.max_concurrent_chunks, 5);
        assert_eq!(config.pipeline.llm_timeout_s, 60);
        assert_eq!(config.pipeline.max_retries, 5);
        assert_eq!(config.pipeline.backoff_base_s, 2);
        assert_eq!(config.storage.collection, "fact_embeddings");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: FactexConfig = toml::from_str(
            r#"
            [chunking]
            chunk_size_words = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size_words, 100);
        assert_eq!(config.chunking.chunk_overlap_words, 50);
        assert_eq!(config.pipeline.max_retries, 5);
    }
}
