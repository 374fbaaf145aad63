use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{retry_after_ms, ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::stream::{parse_sse_line, LineBuffer, SseParsed, StreamEvent};

const STREAM_INCOMPLETE: &str = "stream ended before completion";

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
        }
    }

    async fn post(&self, req: &ChatRequest, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let body = build_request_body(req, stream);
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        debug!(model = %req.model, stream, "sending request to OpenAI");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after_ms(resp.headers()),
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        Ok(resp)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let api_resp: ApiResponse = self
            .post(req, false)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_response(api_resp))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.post(req, true).await?;
        process_openai_stream(resp, req.model.clone(), tx).await;
        Ok(())
    }
}

fn build_request_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    // OpenAI uses a flat messages array; system is prepended as a system message.
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": req.system,
    })];

    for m in &req.messages {
        messages.push(serde_json::json!({
            "role": m.role,
            "content": m.content,
        }));
    }

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "stream": stream,
    });
    if stream {
        // Ask for a final usage chunk.
        body["stream_options"] = serde_json::json!({ "include_usage": true });
    }
    body
}

fn parse_response(resp: ApiResponse) -> ChatResponse {
    let choice = resp.choices.into_iter().next();
    let content = choice
        .as_ref()
        .and_then(|c| c.message.content.as_deref())
        .unwrap_or("")
        .to_string();
    let stop_reason = choice.and_then(|c| c.finish_reason).unwrap_or_default();

    ChatResponse {
        content,
        model: resp.model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp
            .usage
            .as_ref()
            .map(|u| u.completion_tokens)
            .unwrap_or(0),
        stop_reason,
    }
}

/// Accumulates per-stream state while SSE lines arrive.
#[derive(Debug, Default)]
struct StreamState {
    tokens_in: u32,
    tokens_out: u32,
    stop_reason: String,
}

/// What one SSE line means for the consumer.
#[derive(Debug, PartialEq)]
enum LineOutcome {
    Deltas(Vec<String>),
    Finished,
    Ignore,
}

impl StreamState {
    fn feed_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        let Some(SseParsed::Data(data)) = parse_sse_line(line) else {
            return LineOutcome::Ignore;
        };
        // OpenAI signals end-of-stream with a literal `[DONE]` data value
        if data.trim() == "[DONE]" {
            return LineOutcome::Finished;
        }
        let Ok(chunk) = serde_json::from_str::<StreamChunk>(&data) else {
            debug!("skipping unparseable stream chunk");
            return LineOutcome::Ignore;
        };

        // usage arrives on the final chunk when include_usage is set
        if let Some(usage) = &chunk.usage {
            self.tokens_in = usage.prompt_tokens;
            self.tokens_out = usage.completion_tokens;
        }

        let mut deltas = Vec::new();
        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
                self.stop_reason = reason;
            }
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                deltas.push(content);
            }
        }
        if deltas.is_empty() {
            LineOutcome::Ignore
        } else {
            LineOutcome::Deltas(deltas)
        }
    }

    fn into_done(self, model: String) -> StreamEvent {
        StreamEvent::Done {
            model,
            tokens_in: self.tokens_in,
            tokens_out: self.tokens_out,
            stop_reason: self.stop_reason,
        }
    }
}

/// Parse OpenAI streaming SSE response and emit StreamEvents.
/// Each data line contains a JSON delta object; `data: [DONE]` signals end.
async fn process_openai_stream(
    resp: reqwest::Response,
    model: String,
    tx: mpsc::Sender<StreamEvent>,
) {
    relay_sse_bytes(resp.bytes_stream(), model, tx).await;
}

/// Feed raw SSE bytes through `StreamState`.
///
/// `Done` is only sent once the stream reports completion, via `[DONE]` or a
/// finish reason. A body that ends before that is an `Error`.
async fn relay_sse_bytes<S, B, E>(mut byte_stream: S, model: String, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut state = StreamState::default();
    let mut lines = LineBuffer::default();
    let mut saw_done = false;

    'outer: while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        for line in lines.push(chunk.as_ref()) {
            match state.feed_line(&line) {
                LineOutcome::Deltas(deltas) => {
                    for text in deltas {
                        if tx.send(StreamEvent::TextDelta { text }).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }
                LineOutcome::Finished => {
                    saw_done = true;
                    break 'outer;
                }
                LineOutcome::Ignore => {}
            }
        }
    }

    if saw_done || !state.stop_reason.is_empty() {
        let _ = tx.send(state.into_done(model)).await;
    } else {
        warn!("OpenAI stream ended before completion");
        let _ = tx
            .send(StreamEvent::Error {
                message: STREAM_INCOMPLETE.to_string(),
            })
            .await;
    }
}

// OpenAI API response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// OpenAI streaming chunk types

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
