//! Scripted doubles for exercising the runner without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::core::types::{RunStatus, ViolationReport};
use crate::events::{RunEvent, RunObserver};
use crate::io::generator::{ChunkStream, GenerationRequest, TextGenerator};

/// How a scripted stream ends after its chunks.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    Complete,
    Fail(String),
    /// Never ends; only cancellation gets the runner out.
    Hang,
}

#[derive(Debug, Clone)]
enum ScriptedAnswer {
    Text(String),
    Fail(String),
    /// Never answers; only cancellation gets the runner out.
    Hang,
}

#[derive(Debug, Clone)]
enum ScriptedStream {
    Open { chunks: Vec<String>, end: StreamEnd },
    Refused(String),
}

/// Generator replaying scripted streams and short answers in order.
///
/// Every request is recorded. Running out of script is a transport error.
#[derive(Default)]
pub struct ScriptedGenerator {
    streams: Mutex<VecDeque<ScriptedStream>>,
    answers: Mutex<VecDeque<ScriptedAnswer>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_stream(self, stream: ScriptedStream) -> Self {
        self.streams.lock().expect("streams lock").push_back(stream);
        self
    }

    pub fn with_stream(self, chunks: &[&str]) -> Self {
        self.with_stream_ending(chunks, StreamEnd::Complete)
    }

    pub fn with_stream_ending(self, chunks: &[&str], end: StreamEnd) -> Self {
        let chunks = chunks.iter().map(|c| (*c).to_string()).collect();
        self.push_stream(ScriptedStream::Open { chunks, end })
    }

    /// The request itself fails before any chunk.
    pub fn with_refused_stream(self, error: &str) -> Self {
        self.push_stream(ScriptedStream::Refused(error.to_string()))
    }

    fn push_answer(self, answer: ScriptedAnswer) -> Self {
        self.answers.lock().expect("answers lock").push_back(answer);
        self
    }

    pub fn with_answers(self, answers: &[&str]) -> Self {
        answers.iter().fold(self, |generator, answer| {
            generator.push_answer(ScriptedAnswer::Text((*answer).to_string()))
        })
    }

    pub fn with_failed_answer(self, error: &str) -> Self {
        self.push_answer(ScriptedAnswer::Fail(error.to_string()))
    }

    pub fn with_hanging_answer(self) -> Self {
        self.push_answer(ScriptedAnswer::Hang)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn record(&self, request: &GenerationRequest) {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn stream(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        self.record(request);
        let next = self.streams.lock().expect("streams lock").pop_front();
        match next {
            None => Err(anyhow!("scripted generator has no stream left")),
            Some(ScriptedStream::Refused(error)) => Err(anyhow!(error)),
            Some(ScriptedStream::Open { chunks, end }) => {
                let chunks = stream::iter(chunks.into_iter().map(Ok::<String, anyhow::Error>));
                let stream: ChunkStream = match end {
                    StreamEnd::Complete => Box::pin(chunks),
                    StreamEnd::Fail(error) => {
                        Box::pin(chunks.chain(stream::iter([Err(anyhow!(error))])))
                    }
                    StreamEnd::Hang => Box::pin(chunks.chain(stream::pending())),
                };
                Ok(stream)
            }
        }
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        self.record(request);
        let next = self.answers.lock().expect("answers lock").pop_front();
        match next {
            None => Err(anyhow!("scripted generator has no answer left")),
            Some(ScriptedAnswer::Text(text)) => Ok(text),
            Some(ScriptedAnswer::Fail(error)) => Err(anyhow!(error)),
            Some(ScriptedAnswer::Hang) => std::future::pending().await,
        }
    }
}

/// Observer keeping every event for assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<RunEvent>,
}

impl RecordingObserver {
    pub fn statuses(&self) -> Vec<RunStatus> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RunEvent::Status(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RunEvent::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn violations(&self) -> Vec<&ViolationReport> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RunEvent::Violation(report) => Some(report),
                _ => None,
            })
            .collect()
    }
}

impl RunObserver for RecordingObserver {
    fn on_event(&mut self, event: &RunEvent) {
        self.events.push(event.clone());
    }
}
