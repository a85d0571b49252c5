//! Scripted provider for stage and pipeline tests

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{Chunk, LogicalSection, RelevanceSelection, SelectedSection};

use super::llm::{ByteStream, LlmProvider};

/// Scripted collaborator. Every behaviour is set by a builder method.
#[derive(Default)]
pub(crate) struct MockProvider {
    /// chunk index -> number of leading failures (u32::MAX = always fail)
    chunk_failures: HashMap<usize, u32>,
    failure_message: Option<String>,
    /// Adds index-dependent latency so batch members finish out of order
    jitter: bool,
    /// Never returns from analyze_chunk (for timeout and cancellation tests)
    hang_analysis: bool,
    fail_synthesis: bool,
    fail_segmentation: bool,
    fail_compression: bool,
    sections: Option<Vec<LogicalSection>>,
    /// Keep sections whose content contains this keyword; all when unset
    relevance_keyword: Option<String>,
    sse_frames: Vec<String>,
    /// Keep the byte stream open after the scripted frames
    hold_stream_open: bool,

    attempts: Mutex<HashMap<usize, u32>>,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
    pub(crate) analysis_calls: AtomicUsize,
    pub(crate) synthesis_calls: AtomicUsize,
    pub(crate) segmentation_calls: AtomicUsize,
    pub(crate) relevance_calls: AtomicUsize,
    pub(crate) compression_calls: AtomicUsize,
    pub(crate) stream_calls: AtomicUsize,
    pub(crate) last_prompt: Mutex<Option<String>>,
    pub(crate) last_max_output: Mutex<Option<usize>>,
    /// Set once the consolidation byte stream has been dropped
    pub(crate) stream_closed: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_chunk(mut self, index: usize, failures: u32) -> Self {
        self.chunk_failures.insert(index, failures);
        self
    }

    pub(crate) fn failure_message(mut self, message: &str) -> Self {
        self.failure_message = Some(message.to_string());
        self
    }

    pub(crate) fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub(crate) fn hanging_analysis(mut self) -> Self {
        self.hang_analysis = true;
        self
    }

    pub(crate) fn failing_synthesis(mut self) -> Self {
        self.fail_synthesis = true;
        self
    }

    pub(crate) fn failing_segmentation(mut self) -> Self {
        self.fail_segmentation = true;
        self
    }

    pub(crate) fn failing_compression(mut self) -> Self {
        self.fail_compression = true;
        self
    }

    pub(crate) fn with_sections(mut self, sections: Vec<LogicalSection>) -> Self {
        self.sections = Some(sections);
        self
    }

    pub(crate) fn keep_sections_containing(mut self, keyword: &str) -> Self {
        self.relevance_keyword = Some(keyword.to_string());
        self
    }

    pub(crate) fn with_sse(mut self, frames: &[&str]) -> Self {
        self.sse_frames = frames.iter().map(|f| f.to_string()).collect();
        self
    }

    pub(crate) fn holding_stream_open(mut self) -> Self {
        self.hold_stream_open = true;
        self
    }

    pub(crate) fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// SSE frame carrying one content delta
pub(crate) fn delta_frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": content}}]})
    )
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn analyze_chunk(
        &self,
        chunk: &Chunk,
        _total_chunks: usize,
        _total_pages: u32,
    ) -> Result<String> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.hang_analysis {
            std::future::pending::<()>().await;
        }
        if self.jitter {
            let delay = ((chunk.index * 7 + 3) % 5) as u64 * 3;
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let attempt = {
            let mut attempts = self.attempts.lock();
            let entry = attempts.entry(chunk.index).or_insert(0);
            *entry += 1;
            *entry
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.chunk_failures.get(&chunk.index) {
            Some(&failures) if attempt <= failures => Err(Error::llm(
                self.failure_message
                    .clone()
                    .unwrap_or_else(|| "HTTP 503 Service Unavailable".to_string()),
            )),
            _ => Ok(format!("analysis of chunk {}", chunk.index)),
        }
    }

    async fn synthesize_section(
        &self,
        analyses: &[String],
        group_index: usize,
        _total_groups: usize,
    ) -> Result<String> {
        self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_synthesis {
            return Err(Error::llm("HTTP 500 synthesis exploded"));
        }
        Ok(format!("synthesis {}: {}", group_index, analyses.join(" | ")))
    }

    async fn create_logical_sections(&self, combined: &str) -> Result<Vec<LogicalSection>> {
        self.segmentation_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(combined.to_string());
        if self.fail_segmentation {
            return Err(Error::invalid_response("segmentation reply is not valid JSON"));
        }
        Ok(self.sections.clone().unwrap_or_else(|| {
            combined
                .split(crate::generation::SYNTHESIS_DELIMITER)
                .map(LogicalSection::new)
                .collect()
        }))
    }

    async fn filter_relevant_sections(
        &self,
        sections: &[LogicalSection],
        goal: &str,
    ) -> Result<RelevanceSelection> {
        self.relevance_calls.fetch_add(1, Ordering::SeqCst);
        let kept: Vec<SelectedSection> = sections
            .iter()
            .filter(|s| match &self.relevance_keyword {
                Some(keyword) => s.content.contains(keyword.as_str()),
                None => true,
            })
            .map(|s| SelectedSection {
                content: s.content.clone(),
                title: s.metadata.title.clone(),
            })
            .collect();

        Ok(RelevanceSelection {
            reasoning: format!("kept {} sections for '{}'", kept.len(), goal),
            sections: kept,
        })
    }

    async fn compress_section(
        &self,
        content: &str,
        _goal: &str,
        target_chars: usize,
    ) -> Result<String> {
        self.compression_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_compression {
            return Err(Error::llm("HTTP 502 compression unavailable"));
        }
        Ok(content.chars().take(target_chars / 2).collect())
    }

    async fn stream_consolidation(
        &self,
        prompt: &str,
        max_output_tokens: usize,
    ) -> Result<ByteStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        *self.last_max_output.lock() = Some(max_output_tokens);

        let frames: Vec<Result<Bytes>> = self
            .sse_frames
            .iter()
            .map(|f| Ok(Bytes::from(f.clone())))
            .collect();
        let guard = DropFlag(self.stream_closed.clone());
        let tail: ByteStream = if self.hold_stream_open {
            futures::stream::pending().boxed()
        } else {
            futures::stream::empty().boxed()
        };

        Ok(futures::stream::iter(frames)
            .chain(tail)
            .map(move |frame| {
                let _keep = &guard;
                frame
            })
            .boxed())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
