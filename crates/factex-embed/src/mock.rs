//! Deterministic mock embedder for tests.

use async_trait::async_trait;

use factex_core::{Embedder, Result};

/// Hash-based embedder: deterministic, normalized, no model files needed.
///
/// Identical texts always map to identical vectors, so exact-statement
/// queries score ~1.0 against their own entry.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self { dimension: 384 }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let hash = text
                    .bytes()
                    .fold(0u64, |acc, b| acc.wrapping_mul(131).wrapping_add(b as u64));
                let mut v = vec![0.0f32; self.dimension];
                for (i, x) in v.iter_mut().enumerate() {
                    *x = ((hash.wrapping_mul(i as u64 + 1) % 2003) as f32) / 2003.0 - 0.5;
                }
                let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut v {
                        *x /= norm;
                    }
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
