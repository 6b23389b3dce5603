//! Generator port: the runner's only view of the language model.
//!
//! The [`TextGenerator`] trait decouples the runner from the HTTP backend
//! (currently an OpenAI-compatible endpoint). Tests use scripted generators
//! that replay predetermined chunks without touching the network.

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

/// Text chunks of one streamed completion, in arrival order.
///
/// Dropping the stream aborts the underlying request.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Sampling parameters forwarded to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
}

impl SamplingParams {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
            stop: Vec::new(),
        }
    }
}

/// One system directive + user prompt pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub sampling: SamplingParams,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start a streamed completion. Errors before the first chunk are
    /// returned here; errors mid-stream arrive as stream items.
    async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream>;

    /// Complete a short request and return the whole answer.
    async fn complete(&self, request: &GenerationRequest) -> Result<String>;
}
