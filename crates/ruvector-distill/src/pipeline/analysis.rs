//! Concurrent chunk analysis with retry and partial-failure tolerance
//!
//! Chunks are analyzed in fixed-size batches whose members run concurrently.
//! Each call is retried with exponential backoff; a chunk that exhausts its
//! retries gets a failure sentinel in its slot and the run carries on. The
//! result always has one entry per chunk, in chunk order.

use futures_util::future::join_all;
use std::sync::Arc;

use crate::cache::{CachedData, DocumentCache};
use crate::config::PipelineConfig;
use crate::error::Error;
use crate::providers::LlmProvider;
use crate::types::{Chunk, ChunkAnalysis, DocumentFingerprint, Progress, ProgressCallback, Stage};

use super::cancel::CancellationToken;

const CANCELLED_REASON: &str = "cancelled";

/// First-pass analysis of every chunk
pub struct AnalysisStage {
    provider: Arc<dyn LlmProvider>,
    cache: Option<Arc<DocumentCache>>,
    config: PipelineConfig,
}

impl AnalysisStage {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            cache: None,
            config: config.clone(),
        }
    }

    /// Consult and populate `cache` when a fingerprint is supplied
    pub fn with_cache(mut self, cache: Arc<DocumentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Analyze all chunks. Never fails as a whole: failed or cancelled chunks
    /// come back as `ChunkAnalysis::Failed` in their own slot.
    pub async fn analyze_chunks(
        &self,
        chunks: &[Chunk],
        total_pages: u32,
        on_progress: &ProgressCallback,
        fingerprint: Option<&DocumentFingerprint>,
        cancel: &CancellationToken,
    ) -> Vec<ChunkAnalysis> {
        let total = chunks.len();

        if let (Some(fp), Some(cache)) = (fingerprint, &self.cache) {
            if let Some(cached) = cache.load_analyses(fp) {
                if cached.len() == total {
                    tracing::info!("Loaded {} chunk analyses from cache for {}", total, fp);
                    on_progress(Progress::new(
                        Stage::Analysis,
                        total,
                        total,
                        "Loaded analyses from cache",
                    ));
                    return cached;
                }
                tracing::warn!(
                    "Cached analyses for {} cover {} chunks, expected {}; re-analyzing",
                    fp,
                    cached.len(),
                    total
                );
            }
        }

        let batch_size = self.config.batch_size.max(1);
        let batch_count = total.div_ceil(batch_size);
        let mut slots: Vec<Option<ChunkAnalysis>> = vec![None; total];

        tracing::info!(
            "Analyzing {} chunks in {} batches of {} with {}",
            total,
            batch_count,
            batch_size,
            self.provider.name()
        );

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let batch_start = batch_no * batch_size;

            if batch_no > 0 && cancel.sleep(self.config.inter_batch_delay()).await.is_err() {
                break;
            }
            if cancel.is_cancelled() {
                break;
            }

            on_progress(Progress::new(
                Stage::Analysis,
                batch_start,
                total,
                format!(
                    "Analyzing chunks {}-{} of {} (batch {}/{})",
                    batch_start + 1,
                    batch_start + batch.len(),
                    total,
                    batch_no + 1,
                    batch_count
                ),
            ));

            let calls = batch.iter().enumerate().map(|(offset, chunk)| {
                self.analyze_with_retry(batch_start + offset, chunk, total, total_pages, cancel)
            });

            // join_all keeps input order, so offsets map straight back to slots
            for (offset, outcome) in join_all(calls).await.into_iter().enumerate() {
                slots[batch_start + offset] = Some(outcome);
            }

            tracing::debug!("Batch {}/{} complete", batch_no + 1, batch_count);
        }

        let analyses: Vec<ChunkAnalysis> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| ChunkAnalysis::failed(index, CANCELLED_REASON))
            })
            .collect();

        let failed = analyses.iter().filter(|a| a.is_failed()).count();
        if failed > 0 {
            tracing::warn!("{} of {} chunks could not be analyzed", failed, total);
        }

        on_progress(Progress::new(
            Stage::Analysis,
            total,
            total,
            format!("Analyzed {} of {} chunks", total - failed, total),
        ));

        if cancel.is_cancelled() {
            tracing::info!("Analysis cancelled; results not cached");
        } else if failed == 0 {
            if let (Some(fp), Some(cache)) = (fingerprint, &self.cache) {
                cache.save(fp, &CachedData::Analyses(analyses.clone()));
            }
        }

        analyses
    }

    /// One chunk: timeout per call, exponential backoff between attempts
    async fn analyze_with_retry(
        &self,
        index: usize,
        chunk: &Chunk,
        total_chunks: usize,
        total_pages: u32,
        cancel: &CancellationToken,
    ) -> ChunkAnalysis {
        let timeout = self.config.request_timeout();
        let mut retry = 0u32;

        loop {
            let call = async {
                match tokio::time::timeout(
                    timeout,
                    self.provider.analyze_chunk(chunk, total_chunks, total_pages),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(timeout.as_secs())),
                }
            };

            match cancel.run(call).await {
                Ok(text) => return ChunkAnalysis::analyzed(index, text),
                Err(Error::Cancelled) => return ChunkAnalysis::failed(index, CANCELLED_REASON),
                Err(e) if e.is_retryable() && retry < self.config.max_retries => {
                    let delay = self.config.backoff(retry);
                    if e.is_rate_limited() {
                        tracing::warn!(
                            "Chunk {} rate limited (429), retry {}/{} in {:?}",
                            index + 1,
                            retry + 1,
                            self.config.max_retries,
                            delay
                        );
                    } else {
                        tracing::warn!(
                            "Chunk {} failed: {} - retry {}/{} in {:?}",
                            index + 1,
                            e,
                            retry + 1,
                            self.config.max_retries,
                            delay
                        );
                    }

                    if cancel.sleep(delay).await.is_err() {
                        return ChunkAnalysis::failed(index, CANCELLED_REASON);
                    }
                    retry += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Chunk {} not processed after {} attempts: {}",
                        index + 1,
                        retry + 1,
                        e
                    );
                    return ChunkAnalysis::failed(index, e.to_string());
                }
            }
        }
    }
}
