//! OpenAI-compatible Chat Completions client.
//!
//! Streams `data:` server-sent events and yields the text deltas. Bytes are
//! buffered until a full line arrives so multi-byte characters split across
//! network reads decode intact.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::config::GeneratorConfig;
use crate::io::generator::{ChunkStream, GenerationRequest, TextGenerator};

const MAX_STOP_MARKERS: usize = 4;
const MAX_TOKENS_LIMIT: u32 = 512;

pub struct OpenAiGenerator {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        // Streams may outlive `timeout`; only a stalled read ends them.
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Build a client from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("missing API key: set {}", cfg.api_key_env))?;
        Self::new(
            &cfg.base_url,
            &cfg.model,
            api_key,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest, stream: bool) -> ChatRequest<'a> {
        let sampling = &request.sampling;
        let temperature = if sampling.temperature.is_finite() {
            sampling.temperature.clamp(0.0, 2.0)
        } else {
            0.7
        };
        let stop: Vec<&str> = sampling
            .stop
            .iter()
            .take(MAX_STOP_MARKERS)
            .map(String::as_str)
            .collect();
        ChatRequest {
            model: &self.model,
            temperature,
            max_tokens: sampling.max_tokens.map(|n| n.clamp(1, MAX_TOKENS_LIMIT)),
            stop: (!stop.is_empty()).then_some(stop),
            stream,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        }
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.body(request, stream));
        if !stream {
            builder = builder.timeout(self.timeout);
        }
        let response = builder
            .send()
            .await
            .context("send chat completion request")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "chat completion rejected");
            bail!("generator returned {status}: {}", detail.trim());
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    #[instrument(skip_all, fields(model = %self.model, temperature = request.sampling.temperature))]
    async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        let response = self.send(request, true).await?;
        debug!("chat completion stream opened");
        Ok(Box::pin(text_deltas(response.bytes_stream())))
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let response = self.send(request, false).await?;
        let body: ChatCompletion = response
            .json()
            .await
            .context("decode chat completion response")?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<&'a str>>,
    stream: bool,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    let chunk: ChatChunk =
        serde_json::from_str(data).with_context(|| format!("parse stream event {data}"))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty())
        .map_or(SseLine::Skip, SseLine::Delta))
}

fn text_deltas<S, B>(bytes: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    async_stream::try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut pending: Vec<u8> = Vec::new();
        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.context("read chat completion stream")?;
            pending.extend_from_slice(chunk.as_ref());
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_line(line.trim_end())? {
                    SseLine::Delta(text) => yield text,
                    SseLine::Done => break 'read,
                    SseLine::Skip => {}
                }
            }
        }
    }
}
