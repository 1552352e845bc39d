//! Tabular persistence for chunks and their extraction progress.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use factex_core::{now_millis, Chunk, ChunkStatus, FactexError, Result};

use crate::table;

/// Targeted update of a chunk's progress flags.
///
/// Only the fields that are `Some` are touched; a concurrent update to a
/// different flag of the same chunk can never clobber this one because both
/// merges serialize under the store lock.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: Option<ChunkStatus>,
    pub contains_facts: Option<bool>,
    pub error_message: Option<String>,
    pub all_facts_extracted: Option<bool>,
}

impl StatusUpdate {
    pub fn status(status: ChunkStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_contains_facts(mut self, contains_facts: bool) -> Self {
        self.contains_facts = Some(contains_facts);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_all_facts_extracted(mut self, done: bool) -> Self {
        self.all_facts_extracted = Some(done);
        self
    }
}

struct ChunkState {
    /// Rows keyed by `(document_hash, chunk_index)`; the BTreeMap keeps the
    /// CSV artifact in a stable order.
    rows: BTreeMap<(String, u32), Chunk>,

    /// document_name → document_hash, so progress updates can address
    /// chunks by the caller-facing name.
    names: HashMap<String, String>,
}

/// Tabular store of chunks (`all_chunks.csv`).
pub struct ChunkStore {
    path: PathBuf,
    state: Mutex<ChunkState>,
}

impl ChunkStore {
    /// Open (or create) the store under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("all_chunks.csv");
        let loaded: Vec<Chunk> = table::load_rows(&path)?;

        let mut rows = BTreeMap::new();
        let mut names = HashMap::new();
        for chunk in loaded {
            names.insert(chunk.document_name.clone(), chunk.document_hash.clone());
            rows.insert((chunk.document_hash.clone(), chunk.chunk_index), chunk);
        }

        debug!(rows = rows.len(), "loaded chunk table");

        Ok(Self {
            path,
            state: Mutex::new(ChunkState { rows, names }),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ChunkState>> {
        self.state
            .lock()
            .map_err(|_| FactexError::store("chunk store lock poisoned"))
    }

    fn flush(state: &ChunkState, path: &Path) -> Result<()> {
        table::write_rows(path, state.rows.values())
    }

    /// Idempotent upsert keyed by `(document_hash, chunk_index)`.
    ///
    /// A pre-existing row is reset to `pending` for reprocessing (keeping
    /// its `created_at`); a finished row should have been skipped by the
    /// chunker and is left untouched.
    pub fn upsert(&self, chunk: Chunk) -> Result<()> {
        let mut state = self.lock()?;
        let key = (chunk.document_hash.clone(), chunk.chunk_index);

        state
            .names
            .insert(chunk.document_name.clone(), chunk.document_hash.clone());

        match state.rows.get_mut(&key) {
            Some(existing) if existing.all_facts_extracted => {}
            Some(existing) => {
                existing.status = ChunkStatus::Pending;
                existing.contains_facts = false;
                existing.all_facts_extracted = false;
                existing.error_message = None;
                existing.content = chunk.content;
                existing.start_offset = chunk.start_offset;
                existing.updated_at = now_millis();
            }
            None => {
                state.rows.insert(key, chunk);
            }
        }

        Self::flush(&state, &self.path)
    }

    /// Merge progress flags into one chunk row, addressed by document name.
    pub fn set_status(
        &self,
        document_name: &str,
        chunk_index: u32,
        update: StatusUpdate,
    ) -> Result<()> {
        let mut state = self.lock()?;

        let hash = state
            .names
            .get(document_name)
            .cloned()
            .ok_or_else(|| {
                FactexError::store(format!("unknown document {:?}", document_name))
            })?;

        let chunk = state
            .rows
            .get_mut(&(hash, chunk_index))
            .ok_or_else(|| {
                FactexError::store(format!(
                    "unknown chunk {} of document {:?}",
                    chunk_index, document_name
                ))
            })?;

        if let Some(status) = update.status {
            chunk.status = status;
        }
        if let Some(contains_facts) = update.contains_facts {
            chunk.contains_facts = contains_facts;
        }
        if let Some(message) = update.error_message {
            chunk.error_message = Some(message);
        }
        if let Some(done) = update.all_facts_extracted {
            chunk.all_facts_extracted = done;
        }
        chunk.updated_at = now_millis();

        Self::flush(&state, &self.path)
    }

    /// Look up one chunk row.
    pub fn get(&self, document_hash: &str, chunk_index: u32) -> Option<Chunk> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.rows.get(&(document_hash.to_string(), chunk_index)).cloned())
    }

    /// Whether this chunk is fully processed with all candidates decided.
    pub fn is_processed(&self, document_hash: &str, chunk_index: u32) -> bool {
        self.get(document_hash, chunk_index)
            .map(|c| c.status == ChunkStatus::Processed && c.all_facts_extracted)
            .unwrap_or(false)
    }

    /// All chunks of a document, by caller-facing name, in index order.
    pub fn list_by_document(&self, document_name: &str) -> Vec<Chunk> {
        self.state
            .lock()
            .map(|s| {
                s.rows
                    .values()
                    .filter(|c| c.document_name == document_name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All chunks with this document hash, in index order.
    pub fn list_by_hash(&self, document_hash: &str) -> Vec<Chunk> {
        self.state
            .lock()
            .map(|s| {
                s.rows
                    .values()
                    .filter(|c| c.document_hash == document_hash)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove every chunk of a document. Returns how many were removed.
    pub fn purge_document(&self, document_name: &str) -> Result<usize> {
        let mut state = self.lock()?;

        let hash = match state.names.remove(document_name) {
            Some(hash) => hash,
            None => return Ok(0),
        };

        let keys: Vec<(String, u32)> = state
            .rows
            .keys()
            .filter(|(h, _)| *h == hash)
            .cloned()
            .collect();
        let removed = keys.len();
        for key in keys {
            state.rows.remove(&key);
        }

        if removed > 0 {
            Self::flush(&state, &self.path)?;
        }
        Ok(removed)
    }

    pub fn count(&self) -> usize {
        self.state.lock().map(|s| s.rows.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(name: &str, hash: &str, index: u32) -> Chunk {
        Chunk::new(name, hash, index, "words in this chunk", 0, "file://x")
    }

    #[test]
    fn upsert_then_get() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();

        store.upsert(chunk("doc", "h1", 0)).unwrap();
        let got = store.get("h1", 0).unwrap();
        assert_eq!(got.status, ChunkStatus::Pending);
        assert_eq!(got.chunk_index, 0);
    }

    #[test]
    fn set_status_merges_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        store.upsert(chunk("doc", "h1", 0)).unwrap();

        store
            .set_status("doc", 0, StatusUpdate::status(ChunkStatus::Processing))
            .unwrap();
        store
            .set_status(
                "doc",
                0,
                StatusUpdate::status(ChunkStatus::Processed)
                    .with_contains_facts(true)
                    .with_all_facts_extracted(true),
            )
            .unwrap();

        let got = store.get("h1", 0).unwrap();
        assert_eq!(got.status, ChunkStatus::Processed);
        assert!(got.contains_facts);
        assert!(got.all_facts_extracted);
        assert!(got.error_message.is_none());
        assert!(store.is_processed("h1", 0));
    }

    #[test]
    fn error_status_records_message() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        store.upsert(chunk("doc", "h1", 2)).unwrap();

        store
            .set_status(
                "doc",
                2,
                StatusUpdate::status(ChunkStatus::Error).with_error("extractor gave up"),
            )
            .unwrap();

        let got = store.get("h1", 2).unwrap();
        assert_eq!(got.status, ChunkStatus::Error);
        assert_eq!(got.error_message.as_deref(), Some("extractor gave up"));
        assert!(!store.is_processed("h1", 2));
    }

    #[test]
    fn upsert_resets_unfinished_row() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        store.upsert(chunk("doc", "h1", 0)).unwrap();
        store
            .set_status(
                "doc",
                0,
                StatusUpdate::status(ChunkStatus::Error).with_error("boom"),
            )
            .unwrap();

        store.upsert(chunk("doc", "h1", 0)).unwrap();
        let got = store.get("h1", 0).unwrap();
        assert_eq!(got.status, ChunkStatus::Pending);
        assert!(got.error_message.is_none());
    }

    #[test]
    fn upsert_leaves_finished_row_alone() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        store.upsert(chunk("doc", "h1", 0)).unwrap();
        store
            .set_status(
                "doc",
                0,
                StatusUpdate::status(ChunkStatus::Processed).with_all_facts_extracted(true),
            )
            .unwrap();

        store.upsert(chunk("doc", "h1", 0)).unwrap();
        assert!(store.is_processed("h1", 0));
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = ChunkStore::open(dir.path()).unwrap();
            store.upsert(chunk("doc", "h1", 0)).unwrap();
            store.upsert(chunk("doc", "h1", 1)).unwrap();
        }
        let store = ChunkStore::open(dir.path()).unwrap();
        assert_eq!(store.count(), 2);
        let listed = store.list_by_document("doc");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].chunk_index, 0);
        assert_eq!(listed[1].chunk_index, 1);
    }

    #[test]
    fn purge_removes_all_rows_for_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path()).unwrap();
        store.upsert(chunk("doc-a", "h1", 0)).unwrap();
        store.upsert(chunk("doc-a", "h1", 1)).unwrap();
        store.upsert(chunk("doc-b", "h2", 0)).unwrap();

        assert_eq!(store.purge_document("doc-a").unwrap(), 2);
        assert_eq!(store.count(), 1);
        assert_eq!(store.purge_document("doc-a").unwrap(), 0);
    }
}
