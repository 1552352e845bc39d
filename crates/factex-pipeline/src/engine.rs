//! The public API of the fact extraction core.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use factex_chunk::DocumentChunker;
use factex_core::{
    Chunk, Embedder, Fact, FactUpdate, FactexConfig, LlmClient, Report, Result, SearchFilter,
    SearchHit, StoreStats,
};
use factex_index::VectorIndex;
use factex_llm::{FactExtractor, FactVerifier, PromptTemplates};
use factex_store::{ChunkStore, FactStore, RejectedFactStore};

use crate::consistency::Consistency;
use crate::coordinator::PipelineCoordinator;

/// Facade over the stores, the vector index, and the pipeline coordinator.
///
/// All state lives in the configured `data_dir`; constructing an engine on
/// an existing directory resumes exactly where the last process stopped.
pub struct FactEngine {
    chunks: Arc<ChunkStore>,
    facts: Arc<FactStore>,
    rejected: Arc<RejectedFactStore>,
    index: Arc<VectorIndex>,
    consistency: Arc<Consistency>,
    coordinator: PipelineCoordinator,
}

impl FactEngine {
    /// Build an engine with the default prompt templates.
    pub fn new(
        config: FactexConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        Self::with_templates(config, llm, embedder, PromptTemplates::default())
    }

    /// Build an engine with caller-supplied prompt templates.
    pub fn with_templates(
        config: FactexConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
        templates: PromptTemplates,
    ) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        std::fs::create_dir_all(data_dir)?;

        let chunks = Arc::new(ChunkStore::open(data_dir)?);
        let facts = Arc::new(FactStore::open(data_dir)?);
        let rejected = Arc::new(RejectedFactStore::open(data_dir)?);
        let index = Arc::new(VectorIndex::open(
            &data_dir.join("embeddings"),
            &config.storage.collection,
            embedder,
        )?);
        let consistency = Arc::new(Consistency::new(
            facts.clone(),
            rejected.clone(),
            index.clone(),
        ));

        let timeout = Duration::from_secs(config.pipeline.llm_timeout_s);
        let coordinator = PipelineCoordinator::new(
            chunks.clone(),
            DocumentChunker::new(chunks.clone(), &config.chunking),
            FactExtractor::new(llm.clone(), templates.clone(), timeout),
            FactVerifier::new(llm, templates, timeout),
            consistency.clone(),
            config.pipeline.clone(),
        );

        info!(data_dir = ?data_dir, "fact engine ready");

        Ok(Self {
            chunks,
            facts,
            rejected,
            index,
            consistency,
            coordinator,
        })
    }

    /// Submit a document for extraction.
    pub async fn submit(
        &self,
        document_name: &str,
        raw_text: &str,
        source_uri: &str,
    ) -> Result<Report> {
        self.coordinator
            .submit(document_name, raw_text, source_uri)
            .await
    }

    /// Snapshot read of stored facts, optionally restricted to a document.
    /// With `verified_only = false`, rejected facts are appended.
    pub fn get_facts(&self, document_name: Option<&str>, verified_only: bool) -> Vec<Fact> {
        let mut out = match document_name {
            Some(name) => self.facts.get_for_document(name),
            None => self.facts.get_all(),
        };
        if !verified_only {
            let rejected = match document_name {
                Some(name) => self.rejected.get_for_document(name),
                None => self.rejected.get_all(),
            };
            out.extend(rejected);
        }
        out
    }

    /// Semantic search over verified facts.
    ///
    /// Vector hits are hydrated from the tabular store; a hit with no
    /// tabular row indicates a store divergence and is dropped from the
    /// results (repair-on-read).
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        let hits = self.index.query(query, k, filter.as_ref()).await?;

        let mut results = Vec::with_capacity(hits.len());
        for (fact_id, similarity) in hits {
            match self.facts.find_by_id(&fact_id) {
                Some(fact) => results.push(SearchHit { fact, similarity }),
                None => warn!(
                    fact_id = %fact_id,
                    "vector entry has no tabular row; dropping from results"
                ),
            }
        }
        Ok(results)
    }

    /// Snapshot read of a document's chunk rows, in index order.
    pub fn get_chunks(&self, document_name: &str) -> Vec<Chunk> {
        self.chunks.list_by_document(document_name)
    }

    /// Edit a fact's statement and/or flip its verification status.
    pub async fn update_fact(&self, fact_id: &str, update: FactUpdate) -> Result<Fact> {
        self.consistency.update_fact(fact_id, update).await
    }

    /// Remove a document: its chunks, its facts in both stores, and its
    /// vector entries. Returns the total number of rows removed.
    pub async fn purge_document(&self, document_name: &str) -> Result<usize> {
        let purged = self.consistency.purge_document(document_name).await?;
        let chunks_removed = self.chunks.purge_document(document_name)?;
        info!(
            document = document_name,
            verified = purged.verified_removed,
            rejected = purged.rejected_removed,
            chunks = chunks_removed,
            "purged document"
        );
        Ok(purged.verified_removed + purged.rejected_removed + chunks_removed)
    }

    /// Stop starting new chunks; in-flight work completes naturally.
    pub fn cancel(&self) {
        self.coordinator.cancel();
    }

    /// Row counts across the stores.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            verified_facts: self.facts.count(),
            rejected_facts: self.rejected.count(),
            chunks: self.chunks.count(),
            vector_entries: self.index.count(),
        }
    }
}
