//! The pipeline coordinator: chunk → extract → verify → commit.
//!
//! Chunks are submitted in index order under a concurrency semaphore and
//! may complete out of order; within a chunk, extraction strictly precedes
//! verification, and `all_facts_extracted` commits only after the verifier
//! has decided every candidate. LLM calls are the only suspension points —
//! no store lock is ever held across one.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use factex_chunk::DocumentChunker;
use factex_core::{
    now_millis, Chunk, ChunkStatus, Fact, FactexError, PipelineConfig, Report, Result,
    VerificationStatus,
};
use factex_llm::{FactExtractor, FactVerifier};
use factex_store::{ChunkStore, StatusUpdate};

use crate::consistency::Consistency;

#[derive(Debug, Default)]
struct ChunkOutcome {
    chunk_index: u32,
    candidates: usize,
    verified: usize,
    rejected: usize,
    error: Option<String>,
    cancelled: bool,
}

/// Drives a document through the per-chunk state machine.
pub struct PipelineCoordinator {
    chunks: Arc<ChunkStore>,
    chunker: DocumentChunker,
    extractor: FactExtractor,
    verifier: FactVerifier,
    consistency: Arc<Consistency>,
    config: PipelineConfig,
    cancelled: AtomicBool,
}

impl PipelineCoordinator {
    pub fn new(
        chunks: Arc<ChunkStore>,
        chunker: DocumentChunker,
        extractor: FactExtractor,
        verifier: FactVerifier,
        consistency: Arc<Consistency>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            chunks,
            chunker,
            extractor,
            verifier,
            consistency,
            config,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Refuse to start further chunks; in-flight ones run to their natural
    /// boundary. Already-committed results are kept.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        info!("pipeline cancellation requested");
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Process one document end to end.
    pub async fn submit(
        &self,
        document_name: &str,
        raw_text: &str,
        source_uri: &str,
    ) -> Result<Report> {
        let plan = self.chunker.plan(document_name, raw_text, source_uri)?;

        let mut report = Report {
            document_name: document_name.to_string(),
            document_hash: plan.document_hash.clone(),
            already_complete: plan.already_complete,
            chunks_total: plan.total,
            chunks_skipped: plan.skipped,
            ..Report::default()
        };

        if plan.already_complete {
            return Ok(report);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_chunks.max(1)));
        let tasks = plan
            .chunks
            .iter()
            .map(|chunk| self.process_chunk(chunk, semaphore.clone()));
        let outcomes = join_all(tasks).await;

        for outcome in outcomes {
            report.candidates_extracted += outcome.candidates;
            report.verified += outcome.verified;
            report.rejected += outcome.rejected;
            match (&outcome.error, outcome.cancelled) {
                (Some(message), _) => report
                    .errors
                    .push(format!("chunk {}: {}", outcome.chunk_index, message)),
                (None, true) => {}
                (None, false) => report.chunks_processed += 1,
            }
        }

        info!(
            document = document_name,
            processed = report.chunks_processed,
            verified = report.verified,
            rejected = report.rejected,
            errors = report.errors.len(),
            "document submission finished"
        );

        Ok(report)
    }

    async fn process_chunk(&self, chunk: &Chunk, semaphore: Arc<Semaphore>) -> ChunkOutcome {
        let mut outcome = ChunkOutcome {
            chunk_index: chunk.chunk_index,
            ..ChunkOutcome::default()
        };

        if self.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                outcome.error = Some("scheduler shut down".to_string());
                return outcome;
            }
        };

        // Re-check after waiting for a permit.
        if self.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        if let Err(e) = self.mark(chunk, StatusUpdate::status(ChunkStatus::Processing)) {
            outcome.error = Some(e.to_string());
            return outcome;
        }

        let candidates = match self
            .with_backoff(|| self.extractor.extract(&chunk.content))
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                self.mark_error(chunk, &e, &mut outcome);
                return outcome;
            }
        };
        let extracted_at = now_millis();
        outcome.candidates = candidates.len();

        if candidates.is_empty() {
            let update = StatusUpdate::status(ChunkStatus::Processed)
                .with_contains_facts(false)
                .with_all_facts_extracted(true);
            if let Err(e) = self.mark(chunk, update) {
                outcome.error = Some(e.to_string());
            }
            return outcome;
        }

        for candidate in &candidates {
            let verdict = match self
                .with_backoff(|| self.verifier.verify(candidate, &chunk.content))
                .await
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    self.mark_error(chunk, &e, &mut outcome);
                    return outcome;
                }
            };

            let fact = Fact::from_verdict(
                candidate,
                &chunk.document_name,
                chunk.chunk_index,
                &chunk.content,
                &verdict,
                extracted_at,
            );

            let committed = match verdict.status {
                VerificationStatus::Verified => self.consistency.commit_verified(fact).await,
                VerificationStatus::Rejected => self.consistency.commit_rejected(fact).await,
            };
            match committed {
                Ok(_) => match verdict.status {
                    VerificationStatus::Verified => outcome.verified += 1,
                    VerificationStatus::Rejected => outcome.rejected += 1,
                },
                Err(e) => {
                    self.mark_error(chunk, &e, &mut outcome);
                    return outcome;
                }
            }
        }

        let update = StatusUpdate::status(ChunkStatus::Processed)
            .with_contains_facts(true)
            .with_all_facts_extracted(true);
        if let Err(e) = self.mark(chunk, update) {
            outcome.error = Some(e.to_string());
        }
        outcome
    }

    fn mark(&self, chunk: &Chunk, update: StatusUpdate) -> Result<()> {
        self.chunks
            .set_status(&chunk.document_name, chunk.chunk_index, update)
    }

    fn mark_error(&self, chunk: &Chunk, error: &FactexError, outcome: &mut ChunkOutcome) {
        warn!(
            chunk = chunk.chunk_index,
            error = %error,
            "chunk failed"
        );
        outcome.error = Some(error.to_string());
        let update = StatusUpdate::status(ChunkStatus::Error).with_error(error.to_string());
        if let Err(e) = self.mark(chunk, update) {
            warn!(chunk = chunk.chunk_index, error = %e, "failed to record chunk error");
        }
    }

    /// Retry retriable LLM failures with exponential backoff:
    /// `backoff_base_s ^ n` seconds for n = 1..=max_retries.
    async fn with_backoff<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(FactexError::Llm(e)) if e.is_retriable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.backoff_base_s.saturating_pow(attempt);
                    warn!(attempt, delay_s = delay, error = %e, "retriable LLM error, backing off");
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
