//! Content hashing for document and fact identity.
//!
//! Documents are identified by the MD5 of their raw UTF-8 text; facts by the
//! MD5 of their normalized statement. Both are hex-encoded so they survive a
//! round trip through the CSV artifacts unchanged.

use md5::{Digest, Md5};

/// Hex-encoded MD5 of a document's raw text.
pub fn document_hash(raw_text: &str) -> String {
    hex::encode(Md5::digest(raw_text.as_bytes()))
}

/// Normalize a statement for dedup: trim and case-fold.
pub fn normalize_statement(statement: &str) -> String {
    statement.trim().to_lowercase()
}

/// Hex-encoded MD5 of the normalized statement.
///
/// Two statements that differ only in surrounding whitespace or letter case
/// are the same fact.
pub fn fact_hash(statement: &str) -> String {
    hex::encode(Md5::digest(normalize_statement(statement).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_hash_is_hex_md5() {
        // Well-known MD5 test vector.
        assert_eq!(document_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(document_hash("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn fact_hash_ignores_case_and_whitespace() {
        let a = fact_hash("  ACME shipped 12,345 units in 2023.  ");
        let b = fact_hash("acme shipped 12,345 units in 2023.");
        assert_eq!(a, b);
    }

    #[test]
    fn fact_hash_distinguishes_statements() {
        assert_ne!(fact_hash("one fact"), fact_hash("another fact"));
    }
}
