//! Phase-keyed document cache
//!
//! Stores the output of expensive stages per document fingerprint so an
//! unchanged document is not re-analyzed. Caching is an optimization only:
//! every storage failure is logged and treated as a miss.

pub mod clock;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Chunk, ChunkAnalysis, LogicalSection};

pub use clock::{Clock, SystemClock};
pub use store::{CacheStats, DocumentCache};

/// Which stage output an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePhase {
    Chunks,
    Analyses,
    Sections,
}

impl CachePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePhase::Chunks => "chunks",
            CachePhase::Analyses => "analyses",
            CachePhase::Sections => "sections",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chunks" => Some(CachePhase::Chunks),
            "analyses" => Some(CachePhase::Analyses),
            "sections" => Some(CachePhase::Sections),
            _ => None,
        }
    }
}

impl fmt::Display for CachePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached stage output, one variant per phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "data", rename_all = "lowercase")]
pub enum CachedData {
    Chunks(Vec<Chunk>),
    Analyses(Vec<ChunkAnalysis>),
    Sections(Vec<LogicalSection>),
}

impl CachedData {
    pub fn phase(&self) -> CachePhase {
        match self {
            CachedData::Chunks(_) => CachePhase::Chunks,
            CachedData::Analyses(_) => CachePhase::Analyses,
            CachedData::Sections(_) => CachePhase::Sections,
        }
    }

    /// Number of items held
    pub fn len(&self) -> usize {
        match self {
            CachedData::Chunks(v) => v.len(),
            CachedData::Analyses(v) => v.len(),
            CachedData::Sections(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
