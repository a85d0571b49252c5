//! Progress reporting

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Pipeline stage a progress update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Chunking,
    Analysis,
    Synthesis,
    Segmentation,
    Relevance,
    Budget,
    Consolidation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Chunking => "chunking",
            Stage::Analysis => "analysis",
            Stage::Synthesis => "synthesis",
            Stage::Segmentation => "segmentation",
            Stage::Relevance => "relevance filtering",
            Stage::Budget => "budget enforcement",
            Stage::Consolidation => "consolidation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single progress update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub stage: Stage,
    /// Units done so far (chunk index for analysis, group index for synthesis)
    pub current: usize,
    /// Total units in this stage
    pub total: usize,
    /// Human-readable status
    pub status: String,
}

impl Progress {
    pub fn new(stage: Stage, current: usize, total: usize, status: impl Into<String>) -> Self {
        Self {
            stage,
            current,
            total,
            status: status.into(),
        }
    }

    /// Completion in percent, 100 when the stage has no units
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.current.min(self.total) * 100) / self.total) as u8
    }
}

/// Caller-supplied progress sink
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// A callback that drops every update
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_| {})
}
