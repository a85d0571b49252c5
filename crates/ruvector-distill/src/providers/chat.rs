//! OpenAI-compatible chat completions client
//!
//! Works against any server exposing `POST {base_url}/chat/completions`
//! (OpenAI, vLLM, llama.cpp server, LiteLLM gateways, ...). Non-streaming calls
//! return the first choice's message; the consolidation call is requested with
//! `stream: true` and handed back as the raw SSE byte stream.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::generation::{response, PromptBuilder};
use crate::types::{Chunk, LogicalSection, RelevanceSelection};

use super::llm::{ByteStream, LlmProvider};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat completions provider with bearer authentication
pub struct ChatCompletionsProvider {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
    /// Bearer credential
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsProvider {
    /// Create a provider, reading the credential from `config.api_key_env`
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::Config(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit credential.
    ///
    /// `timeout_secs` bounds each non-streaming call end to end. The streaming
    /// call only has connect and per-read limits, so a long answer that keeps
    /// producing tokens is never cut off.
    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout.min(CONNECT_TIMEOUT))
            .read_timeout(timeout)
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Send one prompt and return the reply text
    async fn complete(&self, task: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: PromptBuilder::system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            stream: false,
            max_tokens: None,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("{} request failed: {}", task, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!(
                "{} failed: HTTP {} - {}",
                task, status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| {
                Error::invalid_response(format!("Failed to parse {} response: {}", task, e))
            })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::invalid_response(format!("No text in {} response", task)))
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    async fn analyze_chunk(
        &self,
        chunk: &Chunk,
        total_chunks: usize,
        total_pages: u32,
    ) -> Result<String> {
        let prompt = PromptBuilder::build_analysis_prompt(chunk, total_chunks, total_pages);
        self.complete("analyze-chunk", &prompt).await
    }

    async fn synthesize_section(
        &self,
        analyses: &[String],
        group_index: usize,
        total_groups: usize,
    ) -> Result<String> {
        let prompt = PromptBuilder::build_synthesis_prompt(analyses, group_index, total_groups);
        self.complete("synthesize-section", &prompt).await
    }

    async fn create_logical_sections(&self, combined: &str) -> Result<Vec<LogicalSection>> {
        let prompt = PromptBuilder::build_segmentation_prompt(combined);
        let reply = self.complete("create-logical-sections", &prompt).await?;
        response::parse_sections(&reply)
    }

    async fn filter_relevant_sections(
        &self,
        sections: &[LogicalSection],
        goal: &str,
    ) -> Result<RelevanceSelection> {
        let prompt = PromptBuilder::build_relevance_prompt(sections, goal);
        let reply = self.complete("filter-relevant-sections", &prompt).await?;
        response::parse_relevance(&reply)
    }

    async fn compress_section(
        &self,
        content: &str,
        goal: &str,
        target_chars: usize,
    ) -> Result<String> {
        let prompt = PromptBuilder::build_compression_prompt(content, goal, target_chars);
        self.complete("compress-section", &prompt).await
    }

    async fn stream_consolidation(
        &self,
        prompt: &str,
        max_output_tokens: usize,
    ) -> Result<ByteStream> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: PromptBuilder::system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            stream: true,
            max_tokens: Some(max_output_tokens),
        };

        tracing::info!(
            "Starting streaming consolidation with model: {}",
            self.config.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("Stream request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!(
                "Stream failed: HTTP {} - {}",
                status, body
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Llm(format!("Stream error: {}", e))))
            .boxed())
    }

    fn name(&self) -> &str {
        "chat-completions"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
