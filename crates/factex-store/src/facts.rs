//! Tabular persistence for verified and rejected facts.
//!
//! Both stores share one implementation: an in-memory row vector guarded by
//! a single mutex, deduplicated by `fact_hash`, flushed to its CSV artifact
//! after every mutation. The verified and rejected stores are separate
//! instances over separate files; moves between them are orchestrated by
//! the consistency layer, never by the stores themselves.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};
use ulid::Ulid;

use factex_core::{hash, Fact, FactexError, Result};

use crate::table;

/// Outcome of a `store` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The fact was inserted under this id.
    Inserted(String),
    /// A fact with the same hash already exists; its id is returned and
    /// nothing was written.
    Duplicate(String),
}

impl StoreOutcome {
    /// The id of the stored (or pre-existing) fact.
    pub fn fact_id(&self) -> &str {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

struct TableState {
    rows: Vec<Fact>,
    ids: ulid::Generator,
}

/// A mutex-guarded fact table with CSV persistence.
pub struct FactTable {
    path: PathBuf,
    label: &'static str,
    state: Mutex<TableState>,
}

impl FactTable {
    fn open(path: PathBuf, label: &'static str) -> Result<Self> {
        let loaded: Vec<Fact> = table::load_rows(&path)?;

        // Boundary repair: a row with an empty statement carries no identity
        // and a duplicate hash would break the uniqueness invariant before
        // any operation ran. Drop both, loudly.
        let mut rows: Vec<Fact> = Vec::with_capacity(loaded.len());
        for fact in loaded {
            if fact.statement.trim().is_empty() {
                warn!(store = label, "dropping row with empty statement");
                continue;
            }
            if rows.iter().any(|f: &Fact| f.fact_hash == fact.fact_hash) {
                warn!(store = label, fact_hash = %fact.fact_hash, "dropping duplicate row");
                continue;
            }
            rows.push(fact);
        }

        debug!(store = label, rows = rows.len(), "loaded fact table");

        Ok(Self {
            path,
            label,
            state: Mutex::new(TableState {
                rows,
                ids: ulid::Generator::new(),
            }),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, TableState>> {
        self.state
            .lock()
            .map_err(|_| FactexError::store(format!("{} store lock poisoned", self.label)))
    }

    fn flush(rows: &[Fact], path: &Path) -> Result<()> {
        table::write_rows(path, rows.iter())
    }

    fn next_id(state: &mut TableState) -> String {
        let ulid = state.ids.generate().unwrap_or_else(|_| Ulid::new());
        format!("fact-{}", ulid)
    }

    /// Insert a fact, deduplicating by `fact_hash`.
    ///
    /// A duplicate silently returns the existing id. A fact arriving with a
    /// non-empty `fact_id` (a cross-store move) keeps it; otherwise a
    /// monotonic id is assigned.
    pub fn store(&self, mut fact: Fact) -> Result<StoreOutcome> {
        let mut state = self.lock()?;

        if fact.fact_hash.is_empty() {
            fact.fact_hash = hash::fact_hash(&fact.statement);
        }

        if let Some(existing) = state.rows.iter().find(|f| f.fact_hash == fact.fact_hash) {
            debug!(store = self.label, fact_id = %existing.fact_id, "duplicate fact, skipping");
            return Ok(StoreOutcome::Duplicate(existing.fact_id.clone()));
        }

        if fact.fact_id.is_empty() {
            fact.fact_id = Self::next_id(&mut state);
        }
        let id = fact.fact_id.clone();
        state.rows.push(fact);
        Self::flush(&state.rows, &self.path)?;

        debug!(store = self.label, fact_id = %id, "stored fact");
        Ok(StoreOutcome::Inserted(id))
    }

    /// Remove the fact matching `(document_name, fact_hash(statement))`.
    /// Returns the removed row, if any.
    pub fn remove(&self, document_name: &str, statement: &str) -> Result<Option<Fact>> {
        let target = hash::fact_hash(statement);
        let mut state = self.lock()?;

        let position = state
            .rows
            .iter()
            .position(|f| f.document_name == document_name && f.fact_hash == target);

        match position {
            Some(i) => {
                let fact = state.rows.remove(i);
                Self::flush(&state.rows, &self.path)?;
                debug!(store = self.label, fact_id = %fact.fact_id, "removed fact");
                Ok(Some(fact))
            }
            None => Ok(None),
        }
    }

    /// Remove a fact by id. Returns the removed row, if any.
    pub fn remove_by_id(&self, fact_id: &str) -> Result<Option<Fact>> {
        let mut state = self.lock()?;

        match state.rows.iter().position(|f| f.fact_id == fact_id) {
            Some(i) => {
                let fact = state.rows.remove(i);
                Self::flush(&state.rows, &self.path)?;
                Ok(Some(fact))
            }
            None => Ok(None),
        }
    }

    /// Atomic remove+insert under the single lock, preserving `fact_id`.
    pub fn update(&self, document_name: &str, old_statement: &str, mut new_fact: Fact) -> Result<Fact> {
        let target = hash::fact_hash(old_statement);
        let mut state = self.lock()?;

        let position = state
            .rows
            .iter()
            .position(|f| f.document_name == document_name && f.fact_hash == target)
            .ok_or_else(|| {
                FactexError::store(format!(
                    "no fact with that statement in document {:?}",
                    document_name
                ))
            })?;

        new_fact.rehash();
        if state
            .rows
            .iter()
            .enumerate()
            .any(|(i, f)| i != position && f.fact_hash == new_fact.fact_hash)
        {
            return Err(FactexError::consistency(format!(
                "update would duplicate fact_hash {}",
                new_fact.fact_hash
            )));
        }

        new_fact.fact_id = state.rows[position].fact_id.clone();
        state.rows[position] = new_fact.clone();
        Self::flush(&state.rows, &self.path)?;

        debug!(store = self.label, fact_id = %new_fact.fact_id, "updated fact");
        Ok(new_fact)
    }

    /// Snapshot read of every row.
    pub fn get_all(&self) -> Vec<Fact> {
        self.state.lock().map(|s| s.rows.clone()).unwrap_or_default()
    }

    /// Rows belonging to one document.
    pub fn get_for_document(&self, document_name: &str) -> Vec<Fact> {
        self.state
            .lock()
            .map(|s| {
                s.rows
                    .iter()
                    .filter(|f| f.document_name == document_name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up a row by id.
    pub fn find_by_id(&self, fact_id: &str) -> Option<Fact> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.rows.iter().find(|f| f.fact_id == fact_id).cloned())
    }

    /// Whether a fact with this hash is present.
    pub fn contains_hash(&self, fact_hash: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.rows.iter().any(|f| f.fact_hash == fact_hash))
            .unwrap_or(false)
    }

    /// Remove every row for a document. Returns the removed rows.
    pub fn purge_document(&self, document_name: &str) -> Result<Vec<Fact>> {
        let mut state = self.lock()?;
        let (removed, kept): (Vec<Fact>, Vec<Fact>) = state
            .rows
            .drain(..)
            .partition(|f| f.document_name == document_name);
        state.rows = kept;
        if !removed.is_empty() {
            Self::flush(&state.rows, &self.path)?;
        }
        Ok(removed)
    }

    pub fn count(&self) -> usize {
        self.state.lock().map(|s| s.rows.len()).unwrap_or(0)
    }

    /// In-memory snapshot for the consistency layer.
    pub fn snapshot(&self) -> Vec<Fact> {
        self.get_all()
    }

    /// Replace the whole table from a snapshot and flush.
    pub fn restore(&self, rows: Vec<Fact>) -> Result<()> {
        let mut state = self.lock()?;
        state.rows = rows;
        Self::flush(&state.rows, &self.path)
    }
}

/// Tabular store of verified facts (`all_facts.csv`).
pub struct FactStore {
    table: FactTable,
}

impl FactStore {
    /// Open (or create) the store under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            table: FactTable::open(data_dir.join("all_facts.csv"), "facts")?,
        })
    }
}

impl Deref for FactStore {
    type Target = FactTable;

    fn deref(&self) -> &FactTable {
        &self.table
    }
}

/// Tabular store of rejected facts (`rejected_facts.csv`).
pub struct RejectedFactStore {
    table: FactTable,
}

impl RejectedFactStore {
    /// Open (or create) the store under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            table: FactTable::open(data_dir.join("rejected_facts.csv"), "rejected")?,
        })
    }
}

impl Deref for RejectedFactStore {
    type Target = FactTable;

    fn deref(&self) -> &FactTable {
        &self.table
    }
}
