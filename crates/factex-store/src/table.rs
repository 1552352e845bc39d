//! CSV-backed table persistence.
//!
//! Each store keeps its rows in memory and rewrites its CSV artifact on
//! every mutation: serialize to a buffer, write to a temp file in the same
//! directory, then atomically rename over the target. A reader never
//! observes a half-written table.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use factex_core::{FactexError, Result};

/// Load all rows from a CSV file.
///
/// An absent file is an empty table; an unreadable or unparseable file is a
/// loud [`FactexError::Corrupt`].
pub(crate) fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_path(path)
        .map_err(|e| FactexError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: T = record.map_err(|e| FactexError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Rewrite the CSV file with the given rows, atomically.
pub(crate) fn write_rows<'a, T, I>(path: &Path, rows: I) -> Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| FactexError::store(format!("failed to serialize row: {}", e)))?;
    }
    let buffer = writer
        .into_inner()
        .map_err(|e| FactexError::store(format!("failed to finish CSV: {}", e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| FactexError::store(format!("failed to create temp file: {}", e)))?;
    tmp.write_all(&buffer)
        .map_err(|e| FactexError::store(format!("failed to write temp file: {}", e)))?;
    tmp.persist(path)
        .map_err(|e| FactexError::store(format!("failed to replace {:?}: {}", path, e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        name: String,
        count: u32,
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let rows: Vec<Row> = load_rows(&dir.path().join("absent.csv")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn rows_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");

        let rows = vec![
            Row { name: "a".into(), count: 1 },
            Row { name: "b".into(), count: 2 },
        ];
        write_rows(&path, rows.iter()).unwrap();

        let back: Vec<Row> = load_rows(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn corrupt_file_fails_loudly() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "name,count\nonly-one-field\n").unwrap();

        let err = load_rows::<Row>(&path).unwrap_err();
        assert!(matches!(err, FactexError::Corrupt { .. }));
    }

    #[test]
    fn rewrite_replaces_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");

        write_rows(&path, [Row { name: "a".into(), count: 1 }].iter()).unwrap();
        write_rows(&path, [Row { name: "b".into(), count: 2 }].iter()).unwrap();

        let back: Vec<Row> = load_rows(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].name, "b");
    }
}
