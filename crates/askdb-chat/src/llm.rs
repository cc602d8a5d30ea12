//! OpenAI-compatible chat completions client.
//!
//! Serves as SQL generator, answer streamer and chart generator against any
//! endpoint speaking the `/chat/completions` protocol. Requests are sent
//! with temperature 0; streaming responses are read as server-sent events
//! until `[DONE]` or a `finish_reason`.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use askdb_core::config::LlmConfig;
use askdb_core::types::ChartSpec;

use crate::collaborator::{parse_chart, AnswerStream, AnswerStreamer, ChartGenerator, SqlGenerator};
use crate::error::ChatError;
use crate::prompts;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    strip_delta_leading_space: bool,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChatError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            strip_delta_leading_space: config.strip_delta_leading_space,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, prompt: String, stream: bool) -> Result<reqwest::Response, ChatError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            temperature: 0.0,
            stream,
        };

        let mut req = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, model = %self.model, "Completion request rejected");
            return Err(ChatError::Generation(format!(
                "model endpoint returned {}: {}",
                status,
                text.trim()
            )));
        }
        Ok(resp)
    }

    /// Single-shot completion.
    pub async fn complete(&self, prompt: String) -> Result<String, ChatError> {
        let resp = self.send(prompt, false).await?;
        let data: CompletionResponse = resp.json().await?;
        data.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ChatError::Generation("completion had no choices".to_string()))
    }

    /// Streaming completion yielding non-empty content deltas.
    pub async fn complete_stream(&self, prompt: String) -> Result<AnswerStream, ChatError> {
        let resp = self.send(prompt, true).await?;
        let body: BoxStream<'static, Result<Vec<u8>, ChatError>> = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ChatError::from))
            .boxed();
        Ok(sse_deltas(body, self.strip_delta_leading_space))
    }
}

#[async_trait]
impl SqlGenerator for OpenAiCompatClient {
    async fn generate_sql(
        &self,
        schema: &str,
        transcript: &str,
        question: &str,
    ) -> Result<String, ChatError> {
        let raw = self
            .complete(prompts::sql_prompt(schema, transcript, question))
            .await?;
        debug!(chars = raw.len(), "SQL completion received");
        Ok(raw)
    }
}

#[async_trait]
impl AnswerStreamer for OpenAiCompatClient {
    async fn stream_answer(
        &self,
        question: &str,
        sql: &str,
        result_json: &str,
    ) -> Result<AnswerStream, ChatError> {
        self.complete_stream(prompts::answer_prompt(question, sql, result_json))
            .await
    }
}

#[async_trait]
impl ChartGenerator for OpenAiCompatClient {
    async fn generate_chart(
        &self,
        sql: &str,
        result_json: &str,
    ) -> Result<Option<ChartSpec>, ChatError> {
        let raw = self
            .complete(prompts::chart_prompt(sql, result_json))
            .await
            .map_err(|e| ChatError::Chart(e.to_string()))?;
        let chart = parse_chart(&raw);
        if chart.is_none() {
            debug!("Chart completion held no usable JSON");
        }
        Ok(chart)
    }
}

// =============================================================================
// Server-sent event decoding
// =============================================================================

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>, ChatError>>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
    strip_leading_space: bool,
}

impl SseState {
    fn drain_lines(&mut self) {
        while !self.finished {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.finished = true;
            return;
        }

        let Ok(parsed) = serde_json::from_str::<StreamResponse>(data) else {
            debug!("Skipping undecodable stream line");
            return;
        };
        if let Some(choice) = parsed.choices.into_iter().next() {
            if let Some(content) = choice.delta.content {
                let text = if self.strip_leading_space {
                    strip_single_leading_space(&content)
                } else {
                    content.as_str()
                };
                if !text.is_empty() {
                    self.pending.push_back(text.to_string());
                }
            }
            if choice.finish_reason.is_some() {
                self.finished = true;
            }
        }
    }
}

/// Decode an SSE byte stream into content deltas.
fn sse_deltas(
    body: BoxStream<'static, Result<Vec<u8>, ChatError>>,
    strip_leading_space: bool,
) -> AnswerStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
        strip_leading_space,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.pending.pop_front() {
                return Some((Ok(text), st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    st.buffer.extend_from_slice(&bytes);
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.buffer.push(b'\n');
                    st.drain_lines();
                    st.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Drop exactly one leading space; a double space is left alone.
fn strip_single_leading_space(text: &str) -> &str {
    match text.strip_prefix(' ') {
        Some(rest) if !rest.starts_with(' ') => rest,
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: Vec<&'static str>) -> BoxStream<'static, Result<Vec<u8>, ChatError>> {
        stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec()))).boxed()
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}},\"finish_reason\":null}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    async fn collect(stream: AnswerStream) -> Vec<String> {
        stream.map(|r| r.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_sse_deltas_until_done() {
        let raw: &'static str = Box::leak(
            format!("{}{}data: [DONE]\n\n{}", delta("Total"), delta(": 100\n"), delta("late"))
                .into_boxed_str(),
        );
        let out = collect(sse_deltas(body(vec![raw]), false)).await;
        assert_eq!(out, vec!["Total", ": 100\n"]);
    }

    #[tokio::test]
    async fn test_sse_line_split_across_chunks() {
        let line: &'static str = Box::leak(delta("hello").into_boxed_str());
        let (a, b) = line.split_at(17);
        let out = collect(sse_deltas(body(vec![a, b]), false)).await;
        assert_eq!(out, vec!["hello"]);
    }

    #[tokio::test]
    async fn test_sse_stops_on_finish_reason() {
        let raw = "data: {\"choices\":[{\"delta\":{\"content\":\"last\"},\"finish_reason\":\"stop\"}]}\n\
                   data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"},\"finish_reason\":null}]}\n";
        let out = collect(sse_deltas(body(vec![raw]), false)).await;
        assert_eq!(out, vec!["last"]);
    }

    #[tokio::test]
    async fn test_sse_skips_empty_and_comment_lines() {
        let raw = ": keep-alive\n\ndata: {\"choices\":[{\"delta\":{},\"finish_reason\":null}]}\n\
                   data: {\"choices\":[{\"delta\":{\"content\":\"x\"},\"finish_reason\":null}]}";
        let out = collect(sse_deltas(body(vec![raw]), false)).await;
        assert_eq!(out, vec!["x"]);
    }

    #[tokio::test]
    async fn test_sse_strips_provider_space() {
        let raw: &'static str =
            Box::leak(format!("{}{}{}", delta(" Hello"), delta("  indented"), delta(" ")).into_boxed_str());
        let out = collect(sse_deltas(body(vec![raw]), true)).await;
        assert_eq!(out, vec!["Hello", "  indented"]);
    }

    #[tokio::test]
    async fn test_sse_transport_error_surfaces() {
        let chunks: Vec<Result<Vec<u8>, ChatError>> = vec![
            Ok(delta("a").into_bytes()),
            Err(ChatError::Transport("reset".to_string())),
        ];
        let mut stream = sse_deltas(stream::iter(chunks).boxed(), false);
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(matches!(stream.next().await, Some(Err(ChatError::Transport(_)))));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_strip_single_leading_space() {
        assert_eq!(strip_single_leading_space(" a"), "a");
        assert_eq!(strip_single_leading_space("  a"), "  a");
        assert_eq!(strip_single_leading_space("a"), "a");
        assert_eq!(strip_single_leading_space(" "), "");
    }

    #[test]
    fn test_client_trims_base_url() {
        let config = LlmConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            ..Default::default()
        };
        let client = OpenAiCompatClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/v1");
        assert_eq!(client.model(), "gpt-4o-mini");
    }
}
