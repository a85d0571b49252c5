//! Document, fingerprint and chunk types

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::FingerprintStrategy;

/// Characters sampled by the `Sampled` fingerprint
const FINGERPRINT_SAMPLE_CHARS: usize = 1000;
/// Length of the base64 prefix kept in the `Sampled` fingerprint
const FINGERPRINT_PREFIX_LEN: usize = 50;

/// A source document: raw text plus its declared page count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Display name (used in prompts and logs)
    pub name: String,
    /// Raw text content
    pub content: String,
    /// Declared page count
    pub total_pages: u32,
}

impl Document {
    /// Create a new document
    pub fn new(name: impl Into<String>, content: impl Into<String>, total_pages: u32) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            total_pages,
        }
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Whether the document has any non-whitespace text
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Compute the cache key for this document
    pub fn fingerprint(&self, strategy: FingerprintStrategy) -> DocumentFingerprint {
        match strategy {
            FingerprintStrategy::Sampled => DocumentFingerprint::sampled(&self.content),
            FingerprintStrategy::ContentHash => DocumentFingerprint::content_hash(&self.content),
        }
    }
}

/// Cache key derived from document content.
///
/// The `sampled` form is a cheap heuristic: two documents of equal length that
/// share their first 1000 characters collide. Use `content_hash` when that
/// matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentFingerprint(String);

impl DocumentFingerprint {
    /// `"{len}-{base64(first 1000 chars)[..50]}"`
    pub fn sampled(content: &str) -> Self {
        let len = content.chars().count();
        let sample: String = content.chars().take(FINGERPRINT_SAMPLE_CHARS).collect();
        let encoded = base64::engine::general_purpose::STANDARD.encode(sample.as_bytes());
        let prefix: String = encoded.chars().take(FINGERPRINT_PREFIX_LEN).collect();
        Self(format!("{}-{}", len, prefix))
    }

    /// `"{len}-{sha256(content)}"`
    pub fn content_hash(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self(format!(
            "{}-{}",
            content.chars().count(),
            hex::encode(hasher.finalize())
        ))
    }

    /// Wrap an already-computed key
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An overlapping window of the document, zero-indexed.
///
/// `start` and `end` are character offsets into the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the chunk list
    pub index: usize,
    /// Chunk text
    pub content: String,
    /// First character offset (inclusive)
    pub start: usize,
    /// Last character offset (exclusive)
    pub end: usize,
}

impl Chunk {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}
