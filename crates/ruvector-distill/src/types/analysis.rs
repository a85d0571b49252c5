//! Per-chunk analysis results

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of analyzing one chunk. One per chunk, in chunk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChunkAnalysis {
    /// The collaborator returned an analysis
    Analyzed { chunk_index: usize, text: String },
    /// Every attempt failed (or the run was cancelled)
    Failed { chunk_index: usize, reason: String },
}

impl ChunkAnalysis {
    pub fn analyzed(chunk_index: usize, text: impl Into<String>) -> Self {
        Self::Analyzed {
            chunk_index,
            text: text.into(),
        }
    }

    pub fn failed(chunk_index: usize, reason: impl Into<String>) -> Self {
        Self::Failed {
            chunk_index,
            reason: reason.into(),
        }
    }

    pub fn chunk_index(&self) -> usize {
        match self {
            Self::Analyzed { chunk_index, .. } | Self::Failed { chunk_index, .. } => *chunk_index,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Text handed to synthesis: the analysis, or the failure sentinel
    /// `[CHUNK N NOT PROCESSED: reason]` with a 1-based chunk number.
    pub fn text(&self) -> String {
        match self {
            Self::Analyzed { text, .. } => text.clone(),
            Self::Failed {
                chunk_index,
                reason,
            } => format!("[CHUNK {} NOT PROCESSED: {}]", chunk_index + 1, reason),
        }
    }
}

impl fmt::Display for ChunkAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
