//! LLM collaborator trait used by every pipeline stage

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::{Chunk, LogicalSection, RelevanceSelection};

/// Raw body of a streaming generation call (server-sent events)
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Text-generation capability the pipeline delegates to.
///
/// Each method is one collaborator task. Implementations report failures as
/// errors; rate limiting must surface as an error whose message contains
/// "429" or "rate limit" so the analysis stage can recognise it.
///
/// Implementations:
/// - `ChatCompletionsProvider`: any OpenAI-compatible `/chat/completions` API
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Analyze one chunk of the document
    async fn analyze_chunk(&self, chunk: &Chunk, total_chunks: usize, total_pages: u32)
        -> Result<String>;

    /// Produce one narrative from a group of chunk analyses
    async fn synthesize_section(
        &self,
        analyses: &[String],
        group_index: usize,
        total_groups: usize,
    ) -> Result<String>;

    /// Re-derive topic-coherent sections from the combined syntheses
    async fn create_logical_sections(&self, combined: &str) -> Result<Vec<LogicalSection>>;

    /// Keep the sections that serve `goal`, with a rationale
    async fn filter_relevant_sections(
        &self,
        sections: &[LogicalSection],
        goal: &str,
    ) -> Result<RelevanceSelection>;

    /// Shrink an oversized section towards `target_chars`, keeping what
    /// matters for `goal`
    async fn compress_section(&self, content: &str, goal: &str, target_chars: usize)
        -> Result<String>;

    /// Start the final generation in streaming mode
    async fn stream_consolidation(&self, prompt: &str, max_output_tokens: usize)
        -> Result<ByteStream>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
