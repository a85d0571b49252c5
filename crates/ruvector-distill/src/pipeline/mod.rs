//! Document distillation pipeline
//!
//! Chunker -> analysis (cached) -> synthesis -> segmentation -> relevance
//! -> budget -> streamed consolidation.

pub mod analysis;
pub mod budget;
pub mod cancel;
pub mod consolidation;
pub mod relevance;
pub mod segmentation;
pub mod synthesis;

pub use analysis::AnalysisStage;
pub use budget::{estimate_tokens, BudgetEnforcer};
pub use cancel::CancellationToken;
pub use consolidation::{ConsolidationStreamer, SseEvent, SseParser, TokenStream};
pub use relevance::RelevanceFilter;
pub use segmentation::LogicalSegmentation;
pub use synthesis::SynthesisStage;

use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::cache::{CachedData, DocumentCache};
use crate::config::DistillConfig;
use crate::error::{Error, Result};
use crate::ingestion::DocumentChunker;
use crate::providers::LlmProvider;
use crate::types::{
    Document, DocumentFingerprint, LogicalSection, Progress, ProgressCallback, Stage,
};

/// Runs every stage in order for one document and goal
pub struct DocumentPipeline {
    config: DistillConfig,
    provider: Arc<dyn LlmProvider>,
    cache: Option<Arc<DocumentCache>>,
}

impl DocumentPipeline {
    pub fn new(config: DistillConfig, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            config,
            provider,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<DocumentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &DistillConfig {
        &self.config
    }

    /// Distill `document` for `goal` and stream the consolidated answer.
    ///
    /// Chunk analysis tolerates per-chunk failures; every later stage is
    /// fatal on failure. Cancelling `cancel` stops in-flight calls and the
    /// stream reader.
    pub async fn process(
        &self,
        document: &Document,
        goal: &str,
        document_name: &str,
        on_progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<TokenStream> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        if document.is_empty() {
            return Err(Error::EmptyDocument(document_name.to_string()));
        }
        cancel.check()?;

        tracing::info!(
            "[{}] Processing '{}' ({} chars, {} pages) with {} for goal: \"{}\"",
            run_id,
            document_name,
            document.char_len(),
            document.total_pages,
            self.provider.model(),
            goal
        );

        let fingerprint = self
            .cache
            .as_ref()
            .map(|_| document.fingerprint(self.config.cache.fingerprint));

        let sections = match self.cached_sections(fingerprint.as_ref()) {
            Some(sections) => {
                on_progress(Progress::new(
                    Stage::Segmentation,
                    sections.len(),
                    sections.len(),
                    "Loaded sections from cache",
                ));
                sections
            }
            None => {
                self.derive_sections(document, fingerprint.as_ref(), &on_progress, cancel)
                    .await?
            }
        };
        cancel.check()?;

        on_progress(Progress::new(
            Stage::Relevance,
            0,
            1,
            format!("Selecting sections relevant to \"{}\"", goal),
        ));
        let relevant = RelevanceFilter::new(self.provider.clone())
            .filter_relevant_sections(&sections, goal, cancel)
            .await?;

        on_progress(Progress::new(
            Stage::Budget,
            0,
            1,
            format!("Checking token budget for {} sections", relevant.len()),
        ));
        let relevant = BudgetEnforcer::new(self.provider.clone(), &self.config.pipeline)
            .enforce(relevant, goal, cancel)
            .await?;

        on_progress(Progress::new(
            Stage::Consolidation,
            0,
            1,
            "Generating answer",
        ));
        let stream = ConsolidationStreamer::new(self.provider.clone(), &self.config.pipeline)
            .consolidate_and_stream(
                relevant,
                goal,
                document_name,
                document.total_pages,
                cancel,
            )
            .await?;

        tracing::info!(
            "[{}] Pipeline ready to stream after {:.1}s",
            run_id,
            started.elapsed().as_secs_f64()
        );
        Ok(stream)
    }

    fn cached_sections(
        &self,
        fingerprint: Option<&DocumentFingerprint>,
    ) -> Option<Vec<LogicalSection>> {
        let (fp, cache) = (fingerprint?, self.cache.as_ref()?);
        let sections = cache.load_sections(fp)?;
        if sections.is_empty() {
            return None;
        }
        tracing::info!("Loaded {} logical sections from cache for {}", sections.len(), fp);
        Some(sections)
    }

    /// Chunk, analyze, synthesize and segment
    async fn derive_sections(
        &self,
        document: &Document,
        fingerprint: Option<&DocumentFingerprint>,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<Vec<LogicalSection>> {
        let chunks = DocumentChunker::new(&self.config.chunking)
            .create_chunks(&document.content, document.total_pages);
        on_progress(Progress::new(
            Stage::Chunking,
            chunks.len(),
            chunks.len(),
            format!("Split document into {} chunks", chunks.len()),
        ));

        let mut analysis = AnalysisStage::new(self.provider.clone(), &self.config.pipeline);
        if let Some(cache) = &self.cache {
            analysis = analysis.with_cache(cache.clone());
        }
        let analyses = analysis
            .analyze_chunks(&chunks, document.total_pages, on_progress, fingerprint, cancel)
            .await;
        cancel.check()?;

        let failed = analyses.iter().filter(|a| a.is_failed()).count();
        if failed == analyses.len() {
            tracing::warn!("All {} chunk analyses failed; continuing with placeholders", failed);
        }

        let synthesis_groups = self.config.pipeline.synthesis_groups;
        let syntheses = SynthesisStage::new(self.provider.clone(), synthesis_groups)
            .synthesize_sections(&analyses, on_progress, cancel)
            .await?;

        on_progress(Progress::new(
            Stage::Segmentation,
            0,
            1,
            "Creating logical sections",
        ));
        let sections = LogicalSegmentation::new(self.provider.clone())
            .create_logical_sections(&syntheses, cancel)
            .await?;
        on_progress(Progress::new(
            Stage::Segmentation,
            1,
            1,
            format!("Created {} logical sections", sections.len()),
        ));

        // Only sections derived from complete analyses are cached
        if let (Some(fp), Some(cache)) = (fingerprint, &self.cache) {
            if failed == 0 {
                cache.save(fp, &CachedData::Sections(sections.clone()));
            }
        }

        Ok(sections)
    }
}
