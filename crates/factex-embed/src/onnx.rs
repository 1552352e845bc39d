//! ONNX-based sentence embedder.
//!
//! Runs a MiniLM-class sentence-transformer exported to ONNX: tokenize,
//! run the encoder, mean-pool the token states under the attention mask,
//! L2-normalize. Cosine similarity over the output is what the vector
//! index consumes.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use factex_core::{Embedder, FactexError, Result};

/// all-MiniLM-L6-v2 defaults.
const EMBEDDING_DIM: usize = 384;
const MAX_TOKENS: usize = 256;

/// ONNX embedder over a sentence-transformer model.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Arc<Tokenizer>,
    dimension: usize,
    max_tokens: usize,
}

impl OnnxEmbedder {
    /// Load the model and tokenizer from a model directory containing
    /// `model.onnx` and `tokenizer.json`.
    pub fn from_dir(model_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = model_dir.as_ref();
        Self::new(dir.join("model.onnx"), dir.join("tokenizer.json"))
    }

    /// Load from explicit model and tokenizer paths.
    pub fn new(model_path: impl AsRef<Path>, tokenizer_path: impl AsRef<Path>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        info!("loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| FactexError::embedding(format!("failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| FactexError::embedding(format!("failed to set optimization level: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| FactexError::embedding(format!("failed to set thread count: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| FactexError::embedding(format!("failed to load model: {}", e)))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| FactexError::embedding(format!("failed to load tokenizer: {}", e)))?;

        info!(dim = EMBEDDING_DIM, max_tokens = MAX_TOKENS, "embedder ready");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            dimension: EMBEDDING_DIM,
            max_tokens: MAX_TOKENS,
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| FactexError::embedding(format!("tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);
        let batch_size = encodings.len();

        debug!(batch_size, max_len, "embedding batch");

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let len = ids.len().min(max_len);

            for j in 0..len {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids))
            .map_err(|e| FactexError::embedding(format!("failed to create input tensor: {}", e)))?;
        let attention_tensor = Tensor::from_array((shape.clone(), attention_mask))
            .map_err(|e| FactexError::embedding(format!("failed to create mask tensor: {}", e)))?;
        let token_type_tensor = Tensor::from_array((shape, token_type_ids))
            .map_err(|e| FactexError::embedding(format!("failed to create type tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| FactexError::embedding("embedder session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_tensor,
                "token_type_ids" => token_type_tensor
            ])
            .map_err(|e| FactexError::embedding(format!("inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| FactexError::embedding("no output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| FactexError::embedding(format!("failed to extract tensor: {}", e)))?;

        let shape: Vec<usize> = view.shape().to_vec();
        match shape.len() {
            // (batch, seq, hidden): mean-pool over the sequence.
            3 => Ok(mean_pool(&view, &encodings, max_len)),
            // (batch, hidden): the model pooled already.
            2 => {
                let hidden = shape[1];
                Ok((0..batch_size)
                    .map(|i| l2_normalize((0..hidden).map(|j| view[[i, j]]).collect()))
                    .collect())
            }
            _ => Err(FactexError::embedding(format!(
                "unexpected output shape: {:?}",
                shape
            ))),
        }
    }
}

/// Mean pooling over valid token positions, then L2 normalization.
fn mean_pool(
    tensor: &ArrayViewD<'_, f32>,
    encodings: &[tokenizers::Encoding],
    max_len: usize,
) -> Vec<Vec<f32>> {
    let shape = tensor.shape();
    let seq_len = shape[1];
    let hidden = shape[2];

    encodings
        .iter()
        .enumerate()
        .map(|(i, encoding)| {
            let mask = encoding.get_attention_mask();
            let valid: Vec<usize> = (0..seq_len.min(max_len).min(mask.len()))
                .filter(|&j| mask[j] == 1)
                .collect();

            if valid.is_empty() {
                return vec![0.0; hidden];
            }

            let mut sum = vec![0.0f32; hidden];
            for &j in &valid {
                for k in 0..hidden {
                    sum[k] += tensor[[i, j, k]];
                }
            }
            let n = valid.len() as f32;
            l2_normalize(sum.into_iter().map(|s| s / n).collect())
        })
        .collect()
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Inference runs synchronously; the Session is not Send across the
        // await boundary.
        self.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_unit_length() {
        let v = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_is_stable() {
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
