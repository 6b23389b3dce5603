//! Run events, observers and the observable run state.
//!
//! The runner owns a [`RunSnapshot`] and mutates it only through state
//! changes that are also emitted, in order, as [`RunEvent`]s. Observers see
//! every change synchronously on the runner's task.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::text::{count_letters, count_words};
use crate::core::types::{AttemptInfo, RunStatus, ViolationReport};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    Status(RunStatus),
    /// Full accumulated text after the change.
    Text(String),
    Attempt(Option<AttemptInfo>),
    Violation(ViolationReport),
    Error(Option<String>),
}

pub trait RunObserver: Send {
    fn on_event(&mut self, event: &RunEvent);
}

impl<F> RunObserver for F
where
    F: FnMut(&RunEvent) + Send,
{
    fn on_event(&mut self, event: &RunEvent) {
        self(event);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {
    fn on_event(&mut self, _event: &RunEvent) {}
}

/// Forwards events to another task over an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RunObserver for ChannelObserver {
    fn on_event(&mut self, event: &RunEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// Observable state of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub text: String,
    pub attempt: Option<AttemptInfo>,
    /// Most recent violation, kept after the run ends.
    pub violation: Option<ViolationReport>,
    pub last_error: Option<String>,
}

impl RunSnapshot {
    /// Text that counts towards the score: the recovered prefix when the
    /// displayed text is the invalid one.
    pub fn scored_text(&self) -> &str {
        match &self.violation {
            Some(report) if self.status == RunStatus::Failed && self.text == report.full_text => {
                &report.recovered_prefix
            }
            _ => &self.text,
        }
    }

    pub fn summary(&self) -> RunSummary {
        let scored = self.scored_text();
        RunSummary {
            status: self.status,
            letters: count_letters(scored),
            words: count_words(scored),
            text: scored.to_string(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Final scores of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub letters: usize,
    pub words: usize,
    pub text: String,
    pub last_error: Option<String>,
}

/// Applies state changes to a snapshot and emits the matching events.
pub(crate) struct Emitter<'a> {
    state: &'a mut RunSnapshot,
    observer: &'a mut dyn RunObserver,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(state: &'a mut RunSnapshot, observer: &'a mut dyn RunObserver) -> Self {
        Self { state, observer }
    }

    pub(crate) fn status(&mut self, status: RunStatus) {
        if self.state.status != status {
            self.state.status = status;
            self.observer.on_event(&RunEvent::Status(status));
        }
    }

    pub(crate) fn text(&mut self, text: &str) {
        if self.state.text != text {
            self.state.text.clear();
            self.state.text.push_str(text);
            self.observer.on_event(&RunEvent::Text(self.state.text.clone()));
        }
    }

    pub(crate) fn attempt(&mut self, info: Option<AttemptInfo>) {
        if self.state.attempt != info {
            self.state.attempt = info;
            self.observer.on_event(&RunEvent::Attempt(info));
        }
    }

    pub(crate) fn violation(&mut self, report: ViolationReport) {
        self.observer.on_event(&RunEvent::Violation(report.clone()));
        self.state.violation = Some(report);
    }

    pub(crate) fn error(&mut self, error: Option<String>) {
        if self.state.last_error != error {
            self.state.last_error = error.clone();
            self.observer.on_event(&RunEvent::Error(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_skips_unchanged_values() {
        let mut state = RunSnapshot::default();
        let mut events = Vec::new();
        let mut record = |event: &RunEvent| events.push(event.clone());
        {
            let mut emit = Emitter::new(&mut state, &mut record);
            emit.status(RunStatus::Running);
            emit.status(RunStatus::Running);
            emit.text("abc");
            emit.text("abc");
            emit.error(None);
        }
        assert_eq!(
            events,
            vec![
                RunEvent::Status(RunStatus::Running),
                RunEvent::Text("abc".to_string())
            ]
        );
        assert_eq!(state.text, "abc");
    }

    #[test]
    fn scored_text_prefers_recovered_prefix_on_untruncated_failure() {
        let report = ViolationReport {
            full_text: "Un chat mange".to_string(),
            recovered_prefix: "Un chat ".to_string(),
            reason: "forbidden letter".to_string(),
            highlight: 8..13,
        };
        let snapshot = RunSnapshot {
            status: RunStatus::Failed,
            text: "Un chat mange".to_string(),
            attempt: None,
            violation: Some(report),
            last_error: Some("forbidden letter".to_string()),
        };
        let summary = snapshot.summary();
        assert_eq!(summary.text, "Un chat ");
        assert_eq!(summary.letters, 6);
        assert_eq!(summary.words, 2);
    }

    #[tokio::test]
    async fn channel_observer_forwards_events() {
        let (mut observer, mut rx) = ChannelObserver::new();
        observer.on_event(&RunEvent::Status(RunStatus::Stopped));
        assert_eq!(rx.recv().await, Some(RunEvent::Status(RunStatus::Stopped)));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(RunEvent::Text("a".to_string())).expect("json");
        assert_eq!(json, serde_json::json!({ "type": "text", "data": "a" }));
    }
}
