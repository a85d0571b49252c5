//! Final consolidation call and the streamed answer
//!
//! The collaborator replies with server-sent events carrying chat-completion
//! deltas. A producer task parses the byte stream and forwards each content
//! delta through a bounded channel; the consumer pulls them as a [`TokenStream`].

use futures::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::{ByteStream, LlmProvider};
use crate::types::ConsolidationRequest;

use super::budget::estimate_tokens;
use super::cancel::CancellationToken;

/// Output tokens reserved regardless of section count
const BASE_OUTPUT_TOKENS: usize = 2_000;

/// One parsed SSE line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A content delta
    Token(String),
    /// The `[DONE]` terminator
    Done,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental parser for `data: {...}` lines. Network chunks may split a
/// line (or a UTF-8 sequence) anywhere, so bytes are buffered until a newline.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the events for every completed line
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parse whatever is left once the body ends without a trailing newline
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

/// Malformed or non-data lines yield `None`
fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!("Skipping malformed stream line: {}", e);
            return None;
        }
    };

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(SseEvent::Token)
}

/// Pull-based stream of answer tokens. Dropping it stops the producer task
/// and closes the underlying network body. Once the token is cancelled the
/// stream yields exactly one `Err(Error::Cancelled)` and then ends, even if
/// tokens were still buffered.
pub struct TokenStream {
    inner: ReceiverStream<Result<String>>,
    task: JoinHandle<()>,
    cancel: CancellationToken,
    finished: bool,
}

impl TokenStream {
    /// Spawn the producer reading `body`
    pub fn spawn(body: ByteStream, buffer: usize, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(pump(body, tx, cancel.clone()));
        Self {
            inner: ReceiverStream::new(rx),
            task,
            cancel,
            finished: false,
        }
    }

    /// Drain the stream into one string
    pub async fn into_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(token) = self.next().await {
            text.push_str(&token?);
        }
        Ok(text)
    }
}

impl Stream for TokenStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.cancel.is_cancelled() {
            this.finished = true;
            this.task.abort();
            return Poll::Ready(Some(Err(Error::Cancelled)));
        }

        // The producer exits on cancellation, which closes the channel and
        // wakes us to report it above
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(None) if this.cancel.is_cancelled() => {
                this.finished = true;
                Poll::Ready(Some(Err(Error::Cancelled)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for TokenStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Flow {
    Continue,
    Stop,
}

async fn pump(mut body: ByteStream, tx: mpsc::Sender<Result<String>>, cancel: CancellationToken) {
    let mut parser = SseParser::new();
    let mut tokens = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Consolidation stream cancelled after {} tokens", tokens);
                return;
            }
            _ = tx.closed() => {
                tracing::debug!("Consumer dropped the token stream after {} tokens", tokens);
                return;
            }
            next = body.next() => next,
        };

        let events = match next {
            Some(Ok(bytes)) => parser.feed(&bytes),
            Some(Err(e)) => {
                tracing::error!("Consolidation stream failed: {}", e);
                let _ = tx.send(Err(e)).await;
                return;
            }
            None => {
                let events = parser.finish();
                if let Flow::Continue = forward(events, &tx, &cancel, &mut tokens).await {
                    tracing::warn!("Consolidation stream ended without [DONE] ({} tokens)", tokens);
                }
                return;
            }
        };

        if let Flow::Stop = forward(events, &tx, &cancel, &mut tokens).await {
            return;
        }
    }
}

async fn forward(
    events: Vec<SseEvent>,
    tx: &mpsc::Sender<Result<String>>,
    cancel: &CancellationToken,
    tokens: &mut usize,
) -> Flow {
    for event in events {
        match event {
            SseEvent::Token(token) => {
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!("Consolidation stream cancelled after {} tokens", tokens);
                        false
                    }
                    result = tx.send(Ok(token)) => result.is_ok(),
                };
                if !sent {
                    return Flow::Stop;
                }
                *tokens += 1;
            }
            SseEvent::Done => {
                tracing::info!("Consolidation stream complete ({} tokens)", tokens);
                return Flow::Stop;
            }
        }
    }
    Flow::Continue
}

pub struct ConsolidationStreamer {
    provider: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl ConsolidationStreamer {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            config: config.clone(),
        }
    }

    /// Expected output tokens for `sections` relevant sections
    pub fn output_budget(&self, sections: usize) -> usize {
        (sections * self.config.output_tokens_per_section + BASE_OUTPUT_TOKENS)
            .clamp(self.config.min_output_tokens, self.config.max_output_tokens)
    }

    /// Validate the assembled prompt against the prompt and total ceilings
    pub fn check_budget(&self, prompt: &str, output_tokens: usize) -> Result<usize> {
        let prompt_tokens = estimate_tokens(prompt.chars().count());
        if prompt_tokens > self.config.prompt_token_limit {
            return Err(Error::BudgetExceeded {
                checkpoint: "prompt",
                estimated_tokens: prompt_tokens,
                limit: self.config.prompt_token_limit,
            });
        }

        let total = prompt_tokens + output_tokens;
        if total > self.config.total_token_limit {
            return Err(Error::BudgetExceeded {
                checkpoint: "total",
                estimated_tokens: total,
                limit: self.config.total_token_limit,
            });
        }
        Ok(prompt_tokens)
    }

    /// Dispatch the consolidation call and stream its answer
    pub async fn consolidate_and_stream(
        &self,
        sections: Vec<String>,
        goal: &str,
        document_name: &str,
        total_pages: u32,
        cancel: &CancellationToken,
    ) -> Result<TokenStream> {
        let request = ConsolidationRequest {
            sections,
            user_goal: goal.to_string(),
            document_name: document_name.to_string(),
            total_pages,
        };
        let prompt = PromptBuilder::build_consolidation_prompt(&request);
        let output_tokens = self.output_budget(request.sections.len());

        let prompt_tokens = self.check_budget(&prompt, output_tokens).map_err(|e| {
            tracing::error!("Consolidation rejected before dispatch: {}", e);
            e
        })?;

        tracing::info!(
            "Consolidating {} sections: ~{} prompt tokens, {} output tokens",
            request.sections.len(),
            prompt_tokens,
            output_tokens
        );

        let body = cancel
            .run(self.provider.stream_consolidation(&prompt, output_tokens))
            .await
            .map_err(|e| Error::stage("consolidation", e))?;

        Ok(TokenStream::spawn(
            body,
            self.config.stream_buffer,
            cancel.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{delta_frame, MockProvider};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn streamer(provider: Arc<MockProvider>) -> ConsolidationStreamer {
        ConsolidationStreamer::new(provider, &PipelineConfig::default())
    }

    async fn wait_for(flag: &std::sync::atomic::AtomicBool) -> bool {
        for _ in 0..100 {
            if flag.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn test_parser_handles_split_frames() {
        let mut parser = SseParser::new();
        let frame = delta_frame("héllo");
        let bytes = frame.as_bytes();
        // Split inside the multibyte character
        let split = frame.find('é').unwrap() + 1;

        assert!(parser.feed(&bytes[..split]).is_empty());
        assert_eq!(
            parser.feed(&bytes[split..]),
            vec![SseEvent::Token("héllo".to_string())]
        );
    }

    #[test]
    fn test_parser_skips_noise() {
        let mut parser = SseParser::new();
        let input = format!(
            ": keep-alive\nevent: message\ndata: {{not json\n{}data: {{\"choices\":[]}}\ndata: [DONE]\n",
            delta_frame("ok")
        );

        assert_eq!(
            parser.feed(input.as_bytes()),
            vec![SseEvent::Token("ok".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn test_parser_finish_flushes_last_line() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: [DONE]").is_empty());
        assert_eq!(parser.finish(), vec![SseEvent::Done]);
    }

    #[tokio::test]
    async fn test_streams_tokens_until_done() {
        let frames = [
            delta_frame("Chapter 3 "),
            "data: {broken\n\n".to_string(),
            delta_frame("covers budgets."),
            "data: [DONE]\n\n".to_string(),
            delta_frame("after done"),
        ];
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let provider = Arc::new(MockProvider::new().with_sse(&frames));

        let stream = streamer(provider.clone())
            .consolidate_and_stream(
                vec!["section one".into(), "section two".into()],
                "summarize chapter 3",
                "report.pdf",
                100,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(stream.into_text().await.unwrap(), "Chapter 3 covers budgets.");
        assert_eq!(MockProvider::calls(&provider.stream_calls), 1);
        assert_eq!(*provider.last_max_output.lock(), Some(5_000));

        let prompt = provider.last_prompt.lock().clone().unwrap();
        assert!(prompt.contains("report.pdf"));
        assert!(prompt.contains("summarize chapter 3"));
    }

    #[test]
    fn test_output_budget_is_clamped() {
        let streamer = streamer(Arc::new(MockProvider::new()));
        assert_eq!(streamer.output_budget(1), 4_000);
        assert_eq!(streamer.output_budget(4), 8_000);
        assert_eq!(streamer.output_budget(20), 16_000);
    }

    #[tokio::test]
    async fn test_oversized_prompt_rejected_before_dispatch() {
        let provider = Arc::new(MockProvider::new());
        let sections = vec!["x".repeat(52_000)];

        let err = streamer(provider.clone())
            .consolidate_and_stream(sections, "goal", "doc", 10, &CancellationToken::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            Error::BudgetExceeded {
                checkpoint: "prompt",
                ..
            }
        ));
        assert_eq!(MockProvider::calls(&provider.stream_calls), 0);
    }

    #[tokio::test]
    async fn test_total_ceiling_enforced() {
        let provider = Arc::new(MockProvider::new());
        let config = PipelineConfig {
            total_token_limit: 4_000,
            ..PipelineConfig::default()
        };
        let streamer = ConsolidationStreamer::new(provider.clone(), &config);

        let err = streamer
            .consolidate_and_stream(
                vec!["short".into()],
                "goal",
                "doc",
                1,
                &CancellationToken::new(),
            )
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            Error::BudgetExceeded {
                checkpoint: "total",
                ..
            }
        ));
        assert_eq!(MockProvider::calls(&provider.stream_calls), 0);
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_body() {
        let first = delta_frame("first");
        let provider = Arc::new(
            MockProvider::new()
                .with_sse(&[first.as_str()])
                .holding_stream_open(),
        );

        let mut stream = streamer(provider.clone())
            .consolidate_and_stream(vec!["s".into()], "goal", "doc", 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "first");
        assert!(!provider.stream_closed.load(Ordering::SeqCst));

        drop(stream);
        assert!(wait_for(&provider.stream_closed).await);
    }

    #[tokio::test]
    async fn test_cancel_stops_stream() {
        let first = delta_frame("first");
        let provider = Arc::new(
            MockProvider::new()
                .with_sse(&[first.as_str()])
                .holding_stream_open(),
        );
        let cancel = CancellationToken::new();

        let mut stream = streamer(provider.clone())
            .consolidate_and_stream(vec!["s".into()], "goal", "doc", 1, &cancel)
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "first");
        cancel.cancel();

        let rest: Vec<Result<String>> =
            tokio::time::timeout(Duration::from_secs(1), stream.collect())
                .await
                .expect("stream should end after cancel");
        assert_eq!(rest.len(), 1);
        assert!(matches!(rest[0], Err(Error::Cancelled)));
        assert!(wait_for(&provider.stream_closed).await);
    }

    #[tokio::test]
    async fn test_cancel_reported_with_full_buffer() {
        let frames: Vec<String> = (0..10).map(|i| delta_frame(&format!("t{}", i))).collect();
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let provider = Arc::new(MockProvider::new().with_sse(&frames).holding_stream_open());
        let config = PipelineConfig {
            stream_buffer: 1,
            ..PipelineConfig::default()
        };
        let cancel = CancellationToken::new();

        let mut stream = ConsolidationStreamer::new(provider.clone(), &config)
            .consolidate_and_stream(vec!["s".into()], "goal", "doc", 1, &cancel)
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "t0");
        // Let the producer fill the one-slot buffer and block on the next send
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert!(matches!(stream.next().await, Some(Err(Error::Cancelled))));
        assert!(stream.next().await.is_none());
        assert!(wait_for(&provider.stream_closed).await);
    }

    #[tokio::test]
    async fn test_cancel_after_normal_end_is_ignored() {
        let frames = [delta_frame("only"), "data: [DONE]\n\n".to_string()];
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let provider = Arc::new(MockProvider::new().with_sse(&frames));
        let cancel = CancellationToken::new();

        let mut stream = streamer(provider)
            .consolidate_and_stream(vec!["s".into()], "goal", "doc", 1, &cancel)
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "only");
        assert!(stream.next().await.is_none());
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
