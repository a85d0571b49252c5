//! Core types for the distillation pipeline

pub mod analysis;
pub mod document;
pub mod progress;
pub mod section;

pub use analysis::ChunkAnalysis;
pub use document::{Chunk, Document, DocumentFingerprint};
pub use progress::{no_progress, Progress, ProgressCallback, Stage};
pub use section::{
    ConsolidationRequest, LogicalSection, RelevanceSelection, RelevantSection, SectionMetadata,
    SelectedSection,
};
