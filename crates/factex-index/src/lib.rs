//! factex-index - Semantic index over verified fact statements
//!
//! Embeds statements through an [`Embedder`] and answers top-k cosine
//! similarity queries. Entries persist as one JSON file per named collection
//! under the configured embeddings directory; every mutation rewrites the
//! file through an atomic rename.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use factex_core::{Embedder, FactexError, Result, SearchFilter};

/// Metadata carried with each vector entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryMeta {
    pub document_name: String,
    pub chunk_index: u32,
}

/// One indexed fact statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub fact_id: String,
    pub statement: String,
    pub embedding: Vec<f32>,
    pub meta: EntryMeta,
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Semantic index over verified fact statements.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    path: PathBuf,
    entries: Mutex<HashMap<String, IndexEntry>>,
}

impl VectorIndex {
    /// Open (or create) the collection `collection` under `dir`.
    pub fn open(dir: &Path, collection: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let path = dir.join(format!("{}.json", collection));

        let entries: HashMap<String, IndexEntry> = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let list: Vec<IndexEntry> =
                serde_json::from_str(&raw).map_err(|e| FactexError::Corrupt {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            list.into_iter().map(|e| (e.fact_id.clone(), e)).collect()
        } else {
            HashMap::new()
        };

        info!(collection, entries = entries.len(), "opened vector index");

        Ok(Self {
            embedder,
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, IndexEntry>>> {
        self.entries
            .lock()
            .map_err(|_| FactexError::store("vector index lock poisoned"))
    }

    fn flush(entries: &HashMap<String, IndexEntry>, path: &Path) -> Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        // Stable order keeps the artifact diffable.
        let mut list: Vec<&IndexEntry> = entries.values().collect();
        list.sort_by(|a, b| a.fact_id.cmp(&b.fact_id));
        let buffer = serde_json::to_vec(&list)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| FactexError::store(format!("failed to create temp file: {}", e)))?;
        tmp.write_all(&buffer)
            .map_err(|e| FactexError::store(format!("failed to write temp file: {}", e)))?;
        tmp.persist(path)
            .map_err(|e| FactexError::store(format!("failed to replace {:?}: {}", path, e)))?;
        Ok(())
    }

    /// Add (or replace) the entry for `fact_id`.
    pub async fn add(&self, fact_id: &str, statement: &str, meta: EntryMeta) -> Result<()> {
        let embedding = self.embed_one(statement).await?;

        let mut entries = self.lock()?;
        entries.insert(
            fact_id.to_string(),
            IndexEntry {
                fact_id: fact_id.to_string(),
                statement: statement.to_string(),
                embedding,
                meta,
            },
        );
        Self::flush(&entries, &self.path)?;
        debug!(fact_id, "indexed statement");
        Ok(())
    }

    /// Re-embed an edited statement: delete then add.
    pub async fn update(&self, fact_id: &str, new_statement: &str, meta: EntryMeta) -> Result<()> {
        self.delete(fact_id)?;
        self.add(fact_id, new_statement, meta).await
    }

    /// Remove the entry for `fact_id`. Removing an absent id is a no-op.
    pub fn delete(&self, fact_id: &str) -> Result<()> {
        let mut entries = self.lock()?;
        if entries.remove(fact_id).is_some() {
            Self::flush(&entries, &self.path)?;
            debug!(fact_id, "removed from index");
        }
        Ok(())
    }

    /// Top-k entries by cosine similarity to `text`.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<(String, f32)>> {
        let query = self.embed_one(text).await?;

        let entries = self.lock()?;
        let mut scored: Vec<(String, f32)> = entries
            .values()
            .filter(|e| match filter.and_then(|f| f.document_name.as_deref()) {
                Some(name) => e.meta.document_name == name,
                None => true,
            })
            .map(|e| (e.fact_id.clone(), cosine_similarity(&query, &e.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn count(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// The set of indexed fact ids.
    pub fn fact_ids(&self) -> HashSet<String> {
        self.entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Full in-memory snapshot for the consistency layer.
    pub fn snapshot(&self) -> Vec<IndexEntry> {
        self.entries
            .lock()
            .map(|e| e.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace all entries from a snapshot and flush.
    pub fn restore(&self, snapshot: Vec<IndexEntry>) -> Result<()> {
        let mut entries = self.lock()?;
        *entries = snapshot
            .into_iter()
            .map(|e| (e.fact_id.clone(), e))
            .collect();
        Self::flush(&entries, &self.path)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embedder.embed(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| FactexError::embedding("embedder returned no vector"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Deterministic hash-based embedder, good enough to rank an exact
    /// statement above unrelated ones.
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let hash = text.bytes().fold(0u64, |acc, b| {
                        acc.wrapping_mul(31).wrapping_add(b as u64)
                    });
                    let mut v = vec![0.0f32; 16];
                    for (i, x) in v.iter_mut().enumerate() {
                        *x = ((hash.wrapping_mul(i as u64 + 1) % 1000) as f32) / 1000.0 - 0.5;
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
            16
        }
    }

    fn meta(doc: &str) -> EntryMeta {
        EntryMeta {
            document_name: doc.to_string(),
            chunk_index: 0,
        }
    }

    fn index(dir: &Path) -> VectorIndex {
        VectorIndex::open(dir, "fact_embeddings", Arc::new(HashEmbedder)).unwrap()
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn add_query_delete() {
        let dir = tempfile::TempDir::new().unwrap();
        let idx = index(dir.path());

        idx.add("fact-1", "ACME shipped 12,345 units in 2023.", meta("doc"))
            .await
            .unwrap();
        idx.add("fact-2", "entirely different statement", meta("doc"))
            .await
            .unwrap();
        assert_eq!(idx.count(), 2);

        let hits = idx
            .query("ACME shipped 12,345 units in 2023.", 2, None)
            .await
            .unwrap();
        assert_eq!(hits[0].0, "fact-1");
        assert!((hits[0].1 - 1.0).abs() < 1e-4, "exact statement should score ~1");

        idx.delete("fact-1").unwrap();
        assert_eq!(idx.count(), 1);
        assert!(!idx.fact_ids().contains("fact-1"));
    }

    #[tokio::test]
    async fn repeated_add_replaces() {
        let dir = tempfile::TempDir::new().unwrap();
        let idx = index(dir.path());

        idx.add("fact-1", "first wording", meta("doc")).await.unwrap();
        idx.add("fact-1", "second wording", meta("doc")).await.unwrap();
        assert_eq!(idx.count(), 1);

        let snapshot = idx.snapshot();
        assert_eq!(snapshot[0].statement, "second wording");
    }

    #[tokio::test]
    async fn filter_by_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let idx = index(dir.path());

        idx.add("fact-1", "statement one", meta("doc-a")).await.unwrap();
        idx.add("fact-2", "statement two", meta("doc-b")).await.unwrap();

        let filter = SearchFilter::for_document("doc-b");
        let hits = idx.query("statement", 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "fact-2");
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let idx = index(dir.path());
            idx.add("fact-1", "persisted statement", meta("doc")).await.unwrap();
        }
        let idx = index(dir.path());
        assert_eq!(idx.count(), 1);
        assert!(idx.fact_ids().contains("fact-1"));
    }

    #[tokio::test]
    async fn restore_rolls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let idx = index(dir.path());
        idx.add("fact-1", "kept", meta("doc")).await.unwrap();

        let snapshot = idx.snapshot();
        idx.add("fact-2", "doomed", meta("doc")).await.unwrap();
        assert_eq!(idx.count(), 2);

        idx.restore(snapshot).unwrap();
        assert_eq!(idx.count(), 1);
        assert!(idx.fact_ids().contains("fact-1"));
    }
}
