//! Change detection by content hash.

use sha2::{Digest, Sha256};

use crate::scan::Document;
use crate::state::SyncState;

/// Outcome of comparing a document against the recorded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocClass {
    /// No state entry for this path yet.
    New,
    /// State entry exists but the content hash differs.
    Changed,
    /// Hash matches the last recorded sync. Skipped entirely.
    Unchanged,
}

/// Lowercase hex SHA-256 of raw bytes. Media identity uses this directly.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Deterministic content hash for text documents: CRLF is normalized to LF
/// first so checkouts on different platforms hash identically.
pub fn content_hash(bytes: &[u8]) -> String {
    if bytes.contains(&b'\r') {
        let mut normalized = Vec::with_capacity(bytes.len());
        let mut iter = bytes.iter().peekable();
        while let Some(&b) = iter.next() {
            if b == b'\r' && iter.peek() == Some(&&b'\n') {
                continue;
            }
            normalized.push(b);
        }
        sha256_hex(&normalized)
    } else {
        sha256_hex(bytes)
    }
}

/// Classifies a document against the state's `pages` map.
pub fn classify(document: &Document, state: &SyncState) -> DocClass {
    match state.pages.get(&document.rel_path) {
        None => DocClass::New,
        Some(record) if record.content_hash == document.content_hash => DocClass::Unchanged,
        Some(_) => DocClass::Changed,
    }
}
