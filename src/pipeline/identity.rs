//! Content identity: derive a stable job id from a document's bytes.
//!
//! The id is a SHA-256 digest over the logical name and the digest of the
//! content. Nothing else goes in: upload time, file paths and mtimes never
//! influence the result, so re-submitting identical bytes under the same
//! name lands on the same checkpoint, while any content change yields a new
//! job.
//!
//! Hash collisions are treated as out of scope; SHA-256 is assumed to be
//! strong enough that two different documents never share an id.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque, filesystem-safe job identifier (64 lowercase hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an existing id string, e.g. one received from a progress poll.
    ///
    /// Returns `None` unless the value looks like an id produced by
    /// [`identify`]; this keeps arbitrary strings out of file names.
    pub fn parse(raw: &str) -> Option<Self> {
        let ok = raw.len() == 64 && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        ok.then(|| JobId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the job identity for `(logical_name, content)`.
pub fn identify(logical_name: &str, content: &[u8]) -> JobId {
    let content_digest = Sha256::digest(content);

    let mut hasher = Sha256::new();
    // Length prefix keeps ("ab", "c…") and ("a", "bc…") apart.
    hasher.update((logical_name.len() as u64).to_le_bytes());
    hasher.update(logical_name.as_bytes());
    hasher.update(content_digest);
    JobId(hex::encode(hasher.finalize()))
}

/// SHA-256 hex digest of a chunk's exact transform input.
///
/// Used as the [`crate::pipeline::cache::ResultCache`] key.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_name_same_id() {
        let a = identify("a.txt", b"Hello World");
        let b = identify("a.txt", b"Hello World");
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_same_name_differs() {
        let x = identify("a.txt", b"Hello World");
        let y = identify("a.txt", b"Goodbye World");
        assert_ne!(x, y);
    }

    #[test]
    fn different_name_same_content_differs() {
        assert_ne!(identify("a.txt", b"same"), identify("b.txt", b"same"));
    }

    #[test]
    fn name_boundary_is_unambiguous() {
        assert_ne!(identify("ab", b"c"), identify("a", b"bc"));
    }

    #[test]
    fn id_round_trips_through_parse() {
        let id = identify("book.pdf", b"%PDF-1.7 ...");
        assert_eq!(JobId::parse(id.as_str()), Some(id.clone()));
        assert_eq!(id.as_str().len(), 64);
    }

    #[test]
    fn parse_rejects_path_like_values() {
        assert!(JobId::parse("../etc/passwd").is_none());
        assert!(JobId::parse("").is_none());
        assert!(JobId::parse(&"G".repeat(64)).is_none());
    }

    #[test]
    fn content_hash_is_exact() {
        assert_ne!(content_hash("Hello."), content_hash("Hello. "));
        assert_eq!(content_hash("x"), content_hash("x"));
    }
}
