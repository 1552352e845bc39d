//! Snapshot/restore around multi-store mutations.
//!
//! Any mutation touching more than one of (verified facts, rejected facts,
//! vector index) goes through here: take an in-memory snapshot of all
//! three, mutate, check the cross-store invariants, and roll everything
//! back if a step fails or an invariant breaks. One transaction runs at a
//! time per process; durability comes from each store's own post-mutation
//! flush.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use factex_core::{Fact, FactUpdate, FactexError, Result, VerificationStatus};
use factex_index::{EntryMeta, IndexEntry, VectorIndex};
use factex_store::{FactStore, RejectedFactStore, StoreOutcome};

struct Snapshot {
    facts: Vec<Fact>,
    rejected: Vec<Fact>,
    index: Vec<IndexEntry>,
}

/// Facts removed from the stores by a purge.
pub struct PurgeOutcome {
    pub verified_removed: usize,
    pub rejected_removed: usize,
}

/// The consistency layer over the two fact stores and the vector index.
pub struct Consistency {
    facts: Arc<FactStore>,
    rejected: Arc<RejectedFactStore>,
    index: Arc<VectorIndex>,
    gate: tokio::sync::Mutex<()>,
}

impl Consistency {
    pub fn new(
        facts: Arc<FactStore>,
        rejected: Arc<RejectedFactStore>,
        index: Arc<VectorIndex>,
    ) -> Self {
        Self {
            facts,
            rejected,
            index,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    fn take_snapshot(&self) -> Snapshot {
        Snapshot {
            facts: self.facts.snapshot(),
            rejected: self.rejected.snapshot(),
            index: self.index.snapshot(),
        }
    }

    fn restore(&self, snapshot: Snapshot) {
        // Rollback is best-effort per store; a failure here is logged loudly
        // rather than masking the original error.
        if let Err(e) = self.facts.restore(snapshot.facts) {
            error!(error = %e, "failed to restore verified fact store");
        }
        if let Err(e) = self.rejected.restore(snapshot.rejected) {
            error!(error = %e, "failed to restore rejected fact store");
        }
        if let Err(e) = self.index.restore(snapshot.index) {
            error!(error = %e, "failed to restore vector index");
        }
    }

    /// Invariants 1–3: unique hashes per store, no overlap between stores,
    /// vector index ids identical to verified fact ids.
    fn check_invariants(&self) -> Result<()> {
        let verified = self.facts.snapshot();
        let rejected = self.rejected.snapshot();

        let mut verified_hashes = HashSet::new();
        for fact in &verified {
            if !verified_hashes.insert(fact.fact_hash.as_str()) {
                return Err(FactexError::consistency(format!(
                    "duplicate fact_hash {} in verified store",
                    fact.fact_hash
                )));
            }
        }

        let mut rejected_hashes = HashSet::new();
        for fact in &rejected {
            if !rejected_hashes.insert(fact.fact_hash.as_str()) {
                return Err(FactexError::consistency(format!(
                    "duplicate fact_hash {} in rejected store",
                    fact.fact_hash
                )));
            }
            if verified_hashes.contains(fact.fact_hash.as_str()) {
                return Err(FactexError::consistency(format!(
                    "fact_hash {} present in both stores",
                    fact.fact_hash
                )));
            }
        }

        let verified_ids: HashSet<String> = verified.iter().map(|f| f.fact_id.clone()).collect();
        let index_ids = self.index.fact_ids();
        if verified_ids != index_ids {
            return Err(FactexError::consistency(format!(
                "vector index diverged: {} indexed vs {} verified",
                index_ids.len(),
                verified_ids.len()
            )));
        }

        Ok(())
    }

    fn meta_for(fact: &Fact) -> EntryMeta {
        EntryMeta {
            document_name: fact.document_name.clone(),
            chunk_index: fact.source_chunk_index,
        }
    }

    /// Commit a verified decision: tabular insert, then vector add.
    ///
    /// Duplicates short-circuit without touching the index.
    pub async fn commit_verified(&self, fact: Fact) -> Result<StoreOutcome> {
        let _gate = self.gate.lock().await;
        let snapshot = self.take_snapshot();

        let result = async {
            let outcome = self.facts.store(fact.clone())?;
            if let StoreOutcome::Inserted(id) = &outcome {
                self.index
                    .add(id, &fact.statement, Self::meta_for(&fact))
                    .await?;
            }
            self.check_invariants()?;
            Ok(outcome)
        }
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(error = %e, "verified commit failed, rolling back");
                self.restore(snapshot);
                Err(e)
            }
        }
    }

    /// Commit a rejected decision into the rejected store.
    pub async fn commit_rejected(&self, fact: Fact) -> Result<StoreOutcome> {
        let _gate = self.gate.lock().await;
        let snapshot = self.take_snapshot();

        let result = self
            .rejected
            .store(fact)
            .and_then(|outcome| self.check_invariants().map(|_| outcome));

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(error = %e, "rejected commit failed, rolling back");
                self.restore(snapshot);
                Err(e)
            }
        }
    }

    /// Apply an edit to a stored fact: statement change, status flip, or
    /// both. A status flip is a move between stores preserving `fact_id`;
    /// a statement edit on a verified fact re-embeds its vector entry.
    pub async fn update_fact(&self, fact_id: &str, update: FactUpdate) -> Result<Fact> {
        let _gate = self.gate.lock().await;
        let snapshot = self.take_snapshot();

        let result = self.update_fact_inner(fact_id, update).await;
        match result {
            Ok(fact) => match self.check_invariants() {
                Ok(()) => Ok(fact),
                Err(e) => {
                    warn!(error = %e, "fact update broke invariants, rolling back");
                    self.restore(snapshot);
                    Err(e)
                }
            },
            Err(e) => {
                warn!(error = %e, "fact update failed, rolling back");
                self.restore(snapshot);
                Err(e)
            }
        }
    }

    async fn update_fact_inner(&self, fact_id: &str, update: FactUpdate) -> Result<Fact> {
        let (current, currently_verified) = match self.facts.find_by_id(fact_id) {
            Some(fact) => (fact, true),
            None => match self.rejected.find_by_id(fact_id) {
                Some(fact) => (fact, false),
                None => {
                    return Err(FactexError::FactNotFound {
                        fact_id: fact_id.to_string(),
                    })
                }
            },
        };

        let mut updated = current.clone();
        if let Some(statement) = &update.new_statement {
            updated.statement = statement.clone();
            updated.rehash();
        }
        if let Some(reason) = &update.reason {
            updated.verification_reason = reason.clone();
        }
        let target_status = update.new_status.unwrap_or(current.verification_status);
        updated.verification_status = target_status;
        let target_verified = target_status == VerificationStatus::Verified;

        if currently_verified == target_verified {
            // In-place edit within one store.
            let updated = if currently_verified {
                let fact = self
                    .facts
                    .update(&current.document_name, &current.statement, updated)?;
                if fact.statement != current.statement {
                    self.index
                        .update(&fact.fact_id, &fact.statement, Self::meta_for(&fact))
                        .await?;
                }
                fact
            } else {
                self.rejected
                    .update(&current.document_name, &current.statement, updated)?
            };
            info!(fact_id, "fact updated in place");
            return Ok(updated);
        }

        // Status flip: move between stores, preserving the id.
        if currently_verified {
            self.facts
                .remove_by_id(fact_id)?
                .ok_or_else(|| FactexError::store("fact vanished during update"))?;
            self.index.delete(fact_id)?;
            self.rejected.store(updated.clone())?;
            info!(fact_id, "fact moved verified -> rejected");
        } else {
            self.rejected
                .remove_by_id(fact_id)?
                .ok_or_else(|| FactexError::store("fact vanished during update"))?;
            self.facts.store(updated.clone())?;
            self.index
                .add(fact_id, &updated.statement, Self::meta_for(&updated))
                .await?;
            info!(fact_id, "fact moved rejected -> verified");
        }

        Ok(updated)
    }

    /// Remove every fact of a document from both stores and the index.
    pub async fn purge_document(&self, document_name: &str) -> Result<PurgeOutcome> {
        let _gate = self.gate.lock().await;
        let snapshot = self.take_snapshot();

        let result = async {
            let removed_verified = self.facts.purge_document(document_name)?;
            for fact in &removed_verified {
                self.index.delete(&fact.fact_id)?;
            }
            let removed_rejected = self.rejected.purge_document(document_name)?;
            self.check_invariants()?;
            Ok(PurgeOutcome {
                verified_removed: removed_verified.len(),
                rejected_removed: removed_rejected.len(),
            })
        }
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(error = %e, "purge failed, rolling back");
                self.restore(snapshot);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factex_core::Verdict;
    use factex_embed::MockEmbedder;

    fn fact(statement: &str, status: VerificationStatus) -> Fact {
        Fact::from_verdict(
            statement,
            "doc",
            0,
            "source context",
            &Verdict {
                status,
                reason: "because".into(),
            },
            1,
        )
    }

    fn setup(dir: &std::path::Path) -> Consistency {
        let facts = Arc::new(FactStore::open(dir).unwrap());
        let rejected = Arc::new(RejectedFactStore::open(dir).unwrap());
        let index = Arc::new(
            VectorIndex::open(
                &dir.join("embeddings"),
                "fact_embeddings",
                Arc::new(MockEmbedder::new()),
            )
            .unwrap(),
        );
        Consistency::new(facts, rejected, index)
    }

    #[tokio::test]
    async fn verified_commit_lands_in_both_stores() {
        let dir = tempfile::TempDir::new().unwrap();
        let consistency = setup(dir.path());

        let outcome = consistency
            .commit_verified(fact("a verified fact with 1 metric", VerificationStatus::Verified))
            .await
            .unwrap();

        assert!(!outcome.is_duplicate());
        assert_eq!(consistency.facts.count(), 1);
        assert_eq!(consistency.index.count(), 1);
        assert!(consistency.index.fact_ids().contains(outcome.fact_id()));
    }

    #[tokio::test]
    async fn duplicate_commit_leaves_index_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let consistency = setup(dir.path());

        let first = consistency
            .commit_verified(fact("same statement, 2 units", VerificationStatus::Verified))
            .await
            .unwrap();
        let second = consistency
            .commit_verified(fact("Same statement, 2 units", VerificationStatus::Verified))
            .await
            .unwrap();

        assert!(second.is_duplicate());
        assert_eq!(second.fact_id(), first.fact_id());
        assert_eq!(consistency.facts.count(), 1);
        assert_eq!(consistency.index.count(), 1);
    }

    #[tokio::test]
    async fn status_flip_moves_fact_and_preserves_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let consistency = setup(dir.path());

        let outcome = consistency
            .commit_verified(fact("movable fact with 3 parts", VerificationStatus::Verified))
            .await
            .unwrap();
        let id = outcome.fact_id().to_string();

        let moved = consistency
            .update_fact(
                &id,
                FactUpdate {
                    new_status: Some(VerificationStatus::Rejected),
                    reason: Some("on review, unsupported".into()),
                    ..FactUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(moved.fact_id, id);
        assert_eq!(moved.verification_status, VerificationStatus::Rejected);
        assert_eq!(consistency.facts.count(), 0);
        assert_eq!(consistency.rejected.count(), 1);
        assert_eq!(consistency.index.count(), 0);
    }

    #[tokio::test]
    async fn flip_back_restores_index_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let consistency = setup(dir.path());

        let outcome = consistency
            .commit_verified(fact("round trip fact, 1 hop", VerificationStatus::Verified))
            .await
            .unwrap();
        let id = outcome.fact_id().to_string();

        consistency
            .update_fact(
                &id,
                FactUpdate {
                    new_status: Some(VerificationStatus::Rejected),
                    ..FactUpdate::default()
                },
            )
            .await
            .unwrap();
        consistency
            .update_fact(
                &id,
                FactUpdate {
                    new_status: Some(VerificationStatus::Verified),
                    ..FactUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(consistency.facts.count(), 1);
        assert_eq!(consistency.rejected.count(), 0);
        assert!(consistency.index.fact_ids().contains(&id));
    }

    #[tokio::test]
    async fn statement_edit_reembeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let consistency = setup(dir.path());

        let outcome = consistency
            .commit_verified(fact("original wording, 5 units", VerificationStatus::Verified))
            .await
            .unwrap();
        let id = outcome.fact_id().to_string();

        let updated = consistency
            .update_fact(
                &id,
                FactUpdate {
                    new_statement: Some("corrected wording, 6 units".into()),
                    ..FactUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.fact_id, id);
        let entries = consistency.index.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].statement, "corrected wording, 6 units");
    }

    #[tokio::test]
    async fn unknown_fact_id_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let consistency = setup(dir.path());

        let err = consistency
            .update_fact("fact-missing", FactUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FactexError::FactNotFound { .. }));
    }

    #[tokio::test]
    async fn purge_clears_stores_and_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let consistency = setup(dir.path());

        consistency
            .commit_verified(fact("doc fact 1 of 2", VerificationStatus::Verified))
            .await
            .unwrap();
        consistency
            .commit_rejected(fact("doc reject 1 of 1", VerificationStatus::Rejected))
            .await
            .unwrap();

        let outcome = consistency.purge_document("doc").await.unwrap();
        assert_eq!(outcome.verified_removed, 1);
        assert_eq!(outcome.rejected_removed, 1);
        assert_eq!(consistency.index.count(), 0);
    }
}
