//! Configuration for the distillation pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main distillation configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DistillConfig {
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Stage tuning: retries, batching, token budgets
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Document cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// LLM collaborator configuration
    #[serde(default)]
    pub llm: LlmConfig,
}

impl DistillConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string and validate it
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DistillConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chars_per_page == 0 {
            return Err(Error::Config("chunking.chars_per_page must be > 0".into()));
        }
        if self.chunking.max_chunk_chars == 0 {
            return Err(Error::Config("chunking.max_chunk_chars must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.chunking.overlap_ratio) {
            return Err(Error::Config("chunking.overlap_ratio must be in [0.0, 1.0)".into()));
        }
        if self.pipeline.batch_size == 0 {
            return Err(Error::Config("pipeline.batch_size must be > 0".into()));
        }
        if self.pipeline.synthesis_groups == 0 {
            return Err(Error::Config("pipeline.synthesis_groups must be > 0".into()));
        }
        let p = &self.pipeline;
        if p.section_token_limit > p.prompt_token_limit
            || p.prompt_token_limit > p.total_token_limit
        {
            return Err(Error::Config(
                "token limits must satisfy section <= prompt <= total".into(),
            ));
        }
        if p.min_output_tokens > p.max_output_tokens {
            return Err(Error::Config(
                "pipeline.min_output_tokens must be <= pipeline.max_output_tokens".into(),
            ));
        }
        if p.truncation_chars == 0 {
            return Err(Error::Config("pipeline.truncation_chars must be > 0".into()));
        }
        Ok(())
    }
}

/// Page-based chunk sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Characters assumed per page
    pub chars_per_page: usize,
    /// Hard ceiling on chunk size in characters
    pub max_chunk_chars: usize,
    /// Fraction of the chunk size shared with the next chunk
    pub overlap_ratio: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chars_per_page: 3500,
            max_chunk_chars: 120_000,
            overlap_ratio: 0.15,
        }
    }
}

/// Stage tuning. Defaults match production provider limits; tests shrink the
/// delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retries per chunk analysis after the first attempt
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry
    pub initial_backoff_ms: u64,
    /// Concurrent chunk analyses per batch
    pub batch_size: usize,
    /// Pause between analysis batches
    pub inter_batch_delay_ms: u64,
    /// Per-call timeout, independent of the backoff schedule
    pub request_timeout_secs: u64,
    /// Number of coarse groups fed to synthesis
    pub synthesis_groups: usize,
    /// Above this estimate, oversized sections get compressed
    pub compression_trigger_tokens: usize,
    /// Sections longer than this (chars) are compression candidates
    pub compression_char_threshold: usize,
    /// Length (chars) a section is cut to when compression fails
    pub truncation_chars: usize,
    /// Ceiling for the filtered section set after compression
    pub section_token_limit: usize,
    /// Ceiling for the assembled consolidation prompt
    pub prompt_token_limit: usize,
    /// Ceiling for prompt plus expected output
    pub total_token_limit: usize,
    /// Lower bound of the consolidation output budget
    pub min_output_tokens: usize,
    /// Upper bound of the consolidation output budget
    pub max_output_tokens: usize,
    /// Output tokens reserved per relevant section
    pub output_tokens_per_section: usize,
    /// Token channel capacity between the SSE reader and the consumer
    pub stream_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 2000,
            batch_size: 2,
            inter_batch_delay_ms: 3000,
            request_timeout_secs: 180,
            synthesis_groups: 3,
            compression_trigger_tokens: 10_000,
            compression_char_threshold: 15_000,
            truncation_chars: 12_000,
            section_token_limit: 12_000,
            prompt_token_limit: 20_000,
            total_token_limit: 36_000,
            min_output_tokens: 4_000,
            max_output_tokens: 16_000,
            output_tokens_per_section: 1_500,
            stream_buffer: 64,
        }
    }
}

impl PipelineConfig {
    /// Backoff before retry number `retry` (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(1u64 << retry.min(16)))
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// How documents are keyed in the cache
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintStrategy {
    /// Length plus a base64 sample of the first 1000 characters
    #[default]
    Sampled,
    /// Length plus SHA-256 of the full content
    ContentHash,
}

/// Document cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the cache
    pub enabled: bool,
    /// SQLite file backing the cache
    pub path: PathBuf,
    /// Entry lifetime in hours
    pub ttl_hours: i64,
    /// Fingerprint strategy
    pub fingerprint: FingerprintStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ruvector-distill")
            .join("document-cache.db");

        Self {
            enabled: true,
            path,
            ttl_hours: 24,
            fingerprint: FingerprintStrategy::Sampled,
        }
    }
}

/// LLM collaborator configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL, without the `/chat/completions` suffix
    pub base_url: String,
    /// Environment variable holding the bearer credential
    pub api_key_env: String,
    /// Model name
    pub model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// HTTP client timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            timeout_secs: 300,
        }
    }
}
