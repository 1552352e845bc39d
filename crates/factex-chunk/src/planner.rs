//! Document-level chunk planning against the chunk store.
//!
//! The planner is where resubmission becomes cheap: a document whose chunks
//! are all finished short-circuits, and individual chunks that finished in a
//! previous run are skipped instead of re-queued.

use std::sync::Arc;

use tracing::{debug, info};

use factex_core::{hash, Chunk, ChunkingConfig, FactexError, Result};
use factex_store::ChunkStore;

use crate::splitter::WordSplitter;

/// The chunks a submission still needs to process.
#[derive(Debug)]
pub struct ChunkPlan {
    pub document_hash: String,

    /// Chunks requiring processing, in index order.
    pub chunks: Vec<Chunk>,

    /// Every chunk of this document was already fully processed.
    pub already_complete: bool,

    /// Chunks skipped because a previous run finished them.
    pub skipped: usize,

    /// Total chunks the splitter produced for this document.
    pub total: usize,
}

/// Splits documents and reconciles the result with the chunk store.
pub struct DocumentChunker {
    store: Arc<ChunkStore>,
    splitter: WordSplitter,
}

impl DocumentChunker {
    pub fn new(store: Arc<ChunkStore>, config: &ChunkingConfig) -> Self {
        Self {
            store,
            splitter: WordSplitter::new(config.chunk_size_words, config.chunk_overlap_words),
        }
    }

    /// Plan the chunks for one submission.
    ///
    /// Computes the document hash, short-circuits fully processed documents,
    /// splits the text, persists new work as `pending`, and returns only the
    /// chunks that still need processing.
    pub fn plan(&self, document_name: &str, raw_text: &str, source_uri: &str) -> Result<ChunkPlan> {
        if raw_text.trim().is_empty() {
            return Err(FactexError::EmptyInput);
        }

        let document_hash = hash::document_hash(raw_text);

        let existing = self.store.list_by_hash(&document_hash);
        if !existing.is_empty() && existing.iter().all(|c| c.all_facts_extracted) {
            info!(document = document_name, "document already fully processed");
            return Ok(ChunkPlan {
                document_hash,
                chunks: Vec::new(),
                already_complete: true,
                skipped: existing.len(),
                total: existing.len(),
            });
        }

        let splits = self.splitter.split(raw_text);
        let total = splits.len();
        let mut chunks = Vec::new();
        let mut skipped = 0usize;

        for (index, split) in splits.into_iter().enumerate() {
            let index = index as u32;

            if let Some(existing) = self.store.get(&document_hash, index) {
                if existing.all_facts_extracted {
                    debug!(document = document_name, chunk = index, "chunk already extracted, skipping");
                    skipped += 1;
                    continue;
                }
            }

            let chunk = Chunk::new(
                document_name,
                &document_hash,
                index,
                &split.content,
                split.start_offset,
                source_uri,
            );
            self.store.upsert(chunk.clone())?;
            chunks.push(chunk);
        }

        info!(
            document = document_name,
            total,
            pending = chunks.len(),
            skipped,
            "planned document chunks"
        );

        Ok(ChunkPlan {
            document_hash,
            chunks,
            already_complete: false,
            skipped,
            total,
        })
    }
}
