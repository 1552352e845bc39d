//! Core domain types for the fact extraction pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash;

/// Current Unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Processing state of a chunk.
///
/// Transitions only `pending → processing → processed | error`; a chunk never
/// moves backwards except through an explicit document purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Processed,
    Error,
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A word-bounded slice of a document, the unit of LLM extraction.
///
/// Immutable after creation except for the progress flags, which are only
/// updated through `ChunkStore::set_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Caller-supplied document name.
    pub document_name: String,

    /// Hex MD5 of the document's raw text; the dedup identity.
    pub document_hash: String,

    /// 0-based position in split order.
    pub chunk_index: u32,

    /// The chunk text, a contiguous slice of the original document.
    pub content: String,

    /// Char offset of `content` within the original text.
    pub start_offset: usize,

    /// Where the document came from (path, URL, or caller-defined).
    pub source_uri: String,

    pub status: ChunkStatus,

    /// Meaningful only once `status == Processed`.
    pub contains_facts: bool,

    /// True iff the verifier has decided on every candidate the extractor
    /// produced for this chunk.
    pub all_facts_extracted: bool,

    #[serde(default)]
    pub error_message: Option<String>,

    /// Unix millis.
    pub created_at: u64,

    /// Unix millis.
    pub updated_at: u64,
}

impl Chunk {
    /// Create a fresh pending chunk.
    pub fn new(
        document_name: &str,
        document_hash: &str,
        chunk_index: u32,
        content: &str,
        start_offset: usize,
        source_uri: &str,
    ) -> Self {
        let now = now_millis();
        Self {
            document_name: document_name.to_string(),
            document_hash: document_hash.to_string(),
            chunk_index,
            content: content.to_string(),
            start_offset,
            source_uri: source_uri.to_string(),
            status: ChunkStatus::Pending,
            contains_facts: false,
            all_facts_extracted: false,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Verification outcome of a candidate statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Rejected,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// The verifier's decision for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: VerificationStatus,
    pub reason: String,
}

/// A verified (or rejected) factual statement with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Stable opaque id, assigned by the store on first insert.
    /// Empty string means "not yet stored".
    #[serde(default)]
    pub fact_id: String,

    pub statement: String,

    pub document_name: String,

    /// Index of the chunk the statement was extracted from.
    pub source_chunk_index: u32,

    /// The chunk content at extraction time; the verification context.
    pub original_text: String,

    pub verification_status: VerificationStatus,

    #[serde(default)]
    pub verification_reason: String,

    /// Unix millis.
    pub extracted_at: u64,

    /// Unix millis.
    pub verified_at: u64,

    /// Hex MD5 of the normalized statement; the dedup identity.
    pub fact_hash: String,

    /// Extra string-keyed metadata, persisted as one JSON column.
    #[serde(default, with = "json_map")]
    pub metadata: BTreeMap<String, String>,
}

impl Fact {
    /// Build a fact from a verifier decision. The `fact_id` is left empty
    /// for the store to assign.
    pub fn from_verdict(
        statement: &str,
        document_name: &str,
        source_chunk_index: u32,
        original_text: &str,
        verdict: &Verdict,
        extracted_at: u64,
    ) -> Self {
        Self {
            fact_id: String::new(),
            statement: statement.to_string(),
            document_name: document_name.to_string(),
            source_chunk_index,
            original_text: original_text.to_string(),
            verification_status: verdict.status,
            verification_reason: verdict.reason.clone(),
            extracted_at,
            verified_at: now_millis(),
            fact_hash: hash::fact_hash(statement),
            metadata: BTreeMap::new(),
        }
    }

    /// Recompute the hash after a statement edit.
    pub fn rehash(&mut self) {
        self.fact_hash = hash::fact_hash(&self.statement);
    }
}

/// Outcome of one `submit` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub document_name: String,
    pub document_hash: String,

    /// True when every chunk of this document was already fully processed
    /// and the submission was a no-op.
    pub already_complete: bool,

    /// Chunks produced by the splitter for this document.
    pub chunks_total: usize,

    /// Chunks processed to completion in this call.
    pub chunks_processed: usize,

    /// Chunks skipped because a previous run already finished them.
    pub chunks_skipped: usize,

    pub candidates_extracted: usize,
    pub verified: usize,
    pub rejected: usize,

    /// One entry per failed chunk.
    pub errors: Vec<String>,
}

/// A search result: a verified fact with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub fact: Fact,
    pub similarity: f32,
}

/// Metadata filter for semantic search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Restrict to facts from this document.
    pub document_name: Option<String>,
}

impl SearchFilter {
    pub fn for_document(name: impl Into<String>) -> Self {
        Self {
            document_name: Some(name.into()),
        }
    }
}

/// Requested changes to a stored fact.
#[derive(Debug, Clone, Default)]
pub struct FactUpdate {
    pub new_statement: Option<String>,
    pub new_status: Option<VerificationStatus>,
    pub reason: Option<String>,
}

/// Counts across the persistent stores.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub verified_facts: usize,
    pub rejected_facts: usize,
    pub chunks: usize,
    pub vector_entries: usize,
}

/// Serialize a string map as a single JSON-encoded column so the record
/// stays flat for the CSV artifacts.
mod json_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(map: &BTreeMap<String, String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let json = serde_json::to_string(map).map_err(serde::ser::Error::custom)?;
        json.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(BTreeMap::new()),
            Some(s) if s.trim().is_empty() => Ok(BTreeMap::new()),
            Some(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_starts_pending() {
        let chunk = Chunk::new("doc", "abc123", 0, "some words", 0, "file://doc.txt");
        assert_eq!(chunk.status, ChunkStatus::Pending);
        assert!(!chunk.contains_facts);
        assert!(!chunk.all_facts_extracted);
        assert!(chunk.error_message.is_none());
    }

    #[test]
    fn fact_from_verdict_hashes_statement() {
        let verdict = Verdict {
            status: VerificationStatus::Verified,
            reason: "supported by context".into(),
        };
        let fact = Fact::from_verdict("ACME shipped 12,345 units.", "doc", 0, "ctx", &verdict, 1);
        assert!(fact.fact_id.is_empty());
        assert_eq!(fact.fact_hash, crate::hash::fact_hash("ACME shipped 12,345 units."));
        assert_eq!(fact.verification_status, VerificationStatus::Verified);
    }

    #[test]
    fn metadata_round_trips_through_json_column() {
        let mut fact = Fact::from_verdict(
            "s",
            "doc",
            0,
            "ctx",
            &Verdict {
                status: VerificationStatus::Verified,
                reason: String::new(),
            },
            0,
        );
        fact.metadata.insert("model".into(), "test-model".into());

        let json = serde_json::to_string(&fact).unwrap();
        let back: Fact = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata.get("model").map(String::as_str), Some("test-model"));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&VerificationStatus::Verified).unwrap(),
            "\"verified\""
        );
        assert_eq!(serde_json::to_string(&ChunkStatus::Processed).unwrap(), "\"processed\"");
    }
}
