//! ruvector-distill: Multi-stage document distillation for goal-driven answers
//!
//! This crate turns an arbitrarily large document into a relevance-filtered,
//! token-budgeted context and streams a consolidated answer for a user goal.
//! Chunks are analyzed concurrently with retry and partial-failure tolerance,
//! summarized hierarchically, re-segmented into logical sections, filtered for
//! relevance and compressed when needed. Intermediate results are cached per
//! document in SQLite.

pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod types;

pub use cache::DocumentCache;
pub use config::DistillConfig;
pub use error::{Error, Result};
pub use pipeline::{CancellationToken, DocumentPipeline, TokenStream};
pub use providers::{ChatCompletionsProvider, LlmProvider};
pub use types::{
    document::{Chunk, Document, DocumentFingerprint},
    progress::{Progress, ProgressCallback, Stage},
    section::{LogicalSection, RelevantSection},
};
