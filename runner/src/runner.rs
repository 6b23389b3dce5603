//! Attempt/retry state machine over a streaming generator.
//!
//! A run streams text from the generator, validates the accumulated text as
//! it grows, and on the first violation rolls back to a clean word boundary.
//! In hard mode an early failure is retried from the recovered prefix with a
//! prompt describing the mistake, within a bounded number of attempts.
//!
//! Errors never escape [`Runner::run`]: they end the run in
//! [`RunStatus::Failed`] with `last_error` set.

use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::constraint::{Constraint, ConstraintFamily};
use crate::core::prefix::longest_valid_prefix;
use crate::core::rollback::{
    find_word_bounds, join_continuation, remove_last_sentence, remove_last_word,
    snap_to_word_boundary,
};
use crate::core::text::ends_with_boundary;
use crate::core::types::{
    Attempt, AttemptInfo, Difficulty, Lang, RollbackMode, RunStatus, VersusGoal, ViolationReport,
};
use crate::events::{Emitter, RunObserver, RunSnapshot};
use crate::io::config::RunnerConfig;
use crate::io::generator::{GenerationRequest, SamplingParams, TextGenerator};
use crate::io::prompt::{PromptBuilder, RetryPromptInput, SystemPromptInput};
use crate::word_by_word;

/// What to generate and how hard to try.
#[derive(Clone, Copy)]
pub struct RunRequest<'a> {
    pub constraint: &'a dyn Constraint,
    /// Ignored by constraints without a parameter.
    pub param: &'a str,
    pub difficulty: Difficulty,
    pub lang: Lang,
    pub rollback_mode: RollbackMode,
    pub steering: Option<&'a str>,
    pub goal: Option<VersusGoal>,
}

impl<'a> RunRequest<'a> {
    pub fn new(constraint: &'a dyn Constraint, param: &'a str) -> Self {
        Self {
            constraint,
            param,
            difficulty: Difficulty::Normal,
            lang: Lang::Fr,
            rollback_mode: RollbackMode::Word,
            steering: None,
            goal: None,
        }
    }
}

/// Cancellation state shared between a runner and its stop handles.
#[derive(Default)]
struct StopSlot {
    token: CancellationToken,
    active: bool,
    /// A stop requested between runs, consumed by the next run.
    pending: bool,
}

fn lock(slot: &Mutex<StopSlot>) -> MutexGuard<'_, StopSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the active flag when a run ends or its future is dropped.
struct ActiveRun<'a>(&'a Mutex<StopSlot>);

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        lock(self.0).active = false;
    }
}

/// Stops the current run from another task.
///
/// A stop requested while no run is active applies to the next run, which
/// then ends `stopped` before any request.
#[derive(Clone)]
pub struct StopHandle {
    slot: Arc<Mutex<StopSlot>>,
}

impl StopHandle {
    pub fn stop(&self) {
        let mut slot = lock(&self.slot);
        if slot.active {
            slot.token.cancel();
        } else {
            slot.pending = true;
        }
    }
}

pub struct Runner<G> {
    generator: G,
    config: RunnerConfig,
    prompts: PromptBuilder,
    state: RunSnapshot,
    cancel: Arc<Mutex<StopSlot>>,
}

impl<G: TextGenerator> Runner<G> {
    pub fn new(generator: G, config: RunnerConfig) -> Self {
        Self {
            generator,
            config,
            prompts: PromptBuilder::new(),
            state: RunSnapshot::default(),
            cancel: Arc::default(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn snapshot(&self) -> &RunSnapshot {
        &self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            slot: Arc::clone(&self.cancel),
        }
    }

    /// Cancel the in-flight request, if any. A running run becomes stopped.
    pub fn stop(&mut self) {
        lock(&self.cancel).token.cancel();
        if self.state.status == RunStatus::Running {
            self.state.status = RunStatus::Stopped;
        }
    }

    /// Cancel everything, drop any pending stop and return to `ready` with
    /// empty state.
    pub fn reset(&mut self) {
        let mut slot = lock(&self.cancel);
        slot.token.cancel();
        slot.token = CancellationToken::new();
        slot.pending = false;
        drop(slot);
        self.state = RunSnapshot::default();
    }

    /// Cancel the previous token and install a fresh one for a new run. A
    /// pending stop cancels the fresh token right away.
    fn begin_run(&self) -> CancellationToken {
        let mut slot = lock(&self.cancel);
        slot.token.cancel();
        slot.token = CancellationToken::new();
        if std::mem::take(&mut slot.pending) {
            info!("stop requested before the run started");
            slot.token.cancel();
        }
        slot.active = true;
        slot.token.clone()
    }

    /// Run to completion, failure or stop, reporting every state change to
    /// `observer`. Returns the final snapshot.
    #[instrument(skip_all, fields(constraint = request.constraint.id(), difficulty = ?request.difficulty))]
    pub async fn run(
        &mut self,
        request: &RunRequest<'_>,
        observer: &mut dyn RunObserver,
    ) -> RunSnapshot {
        let token = self.begin_run();
        let _active = ActiveRun(&self.cancel);
        self.state = RunSnapshot::default();
        let session = Session {
            generator: &self.generator,
            config: &self.config,
            prompts: &self.prompts,
            request,
            token,
            emit: Emitter::new(&mut self.state, observer),
        };
        session.drive().await;
        self.state.clone()
    }
}

/// Why an attempt ended without a clean completion.
struct AttemptFailure {
    full_text: String,
    recovered_prefix: String,
    reason: String,
}

enum AttemptOutcome {
    Completed,
    Cancelled,
    Failed(AttemptFailure),
}

/// Borrowed view of a runner for the duration of one run.
pub(crate) struct Session<'a, G> {
    pub(crate) generator: &'a G,
    pub(crate) config: &'a RunnerConfig,
    pub(crate) prompts: &'a PromptBuilder,
    pub(crate) request: &'a RunRequest<'a>,
    pub(crate) token: CancellationToken,
    pub(crate) emit: Emitter<'a>,
}

impl<G: TextGenerator> Session<'_, G> {
    async fn drive(mut self) {
        let request = *self.request;
        let spec = request.constraint.param_spec();
        if !spec.accepts(request.param) {
            self.fail(format!(
                "constraint {} needs a parameter: {}",
                request.constraint.id(),
                spec.describe()
            ));
            return;
        }

        self.emit.status(RunStatus::Running);
        let system = match self.prompts.system(&SystemPromptInput {
            lang: request.lang,
            constraint: request.constraint,
            param: request.param,
            difficulty: request.difficulty,
            steering: request.steering,
            goal: request.goal,
        }) {
            Ok(system) => system,
            Err(err) => {
                self.fail(format!("{err:#}"));
                return;
            }
        };

        if request.constraint.family() == ConstraintFamily::LengthSequence {
            word_by_word::generate(&mut self, &system).await;
        } else {
            self.stream_with_retries(&system).await;
        }
    }

    async fn stream_with_retries(&mut self, system: &str) {
        let request = *self.request;
        let policy = self.config.attempt_policy(request.difficulty);
        self.emit.attempt(Some(AttemptInfo {
            attempt: 1,
            max: policy.max_attempts,
            retrying: false,
        }));

        let start = match self.prompts.start(request.lang) {
            Ok(prompt) => prompt,
            Err(err) => return self.fail(format!("{err:#}")),
        };
        let first = Attempt {
            index: 1,
            temperature: policy.first_temperature,
            base_text: String::new(),
            rollback: None,
        };
        let mut failure = match self.stream_attempt(system, &start, &first).await {
            AttemptOutcome::Completed | AttemptOutcome::Cancelled => {
                return self.emit.status(RunStatus::Stopped);
            }
            AttemptOutcome::Failed(failure) => failure,
        };

        let mut attempts_used = 1;
        while policy.should_retry(attempts_used, failure.recovered_prefix.chars().count()) {
            attempts_used += 1;
            self.emit.attempt(Some(AttemptInfo {
                attempt: attempts_used,
                max: policy.max_attempts,
                retrying: true,
            }));
            info!(
                attempt = attempts_used,
                prefix_chars = failure.recovered_prefix.chars().count(),
                "retrying from recovered prefix"
            );
            let prompt = match self.prompts.retry(&RetryPromptInput {
                lang: request.lang,
                attempt: attempts_used,
                max_attempts: policy.max_attempts,
                full_text: &failure.full_text,
                recovered_prefix: &failure.recovered_prefix,
                reason: &failure.reason,
            }) {
                Ok(prompt) => prompt,
                Err(err) => return self.fail(format!("{err:#}")),
            };
            let attempt = Attempt {
                index: attempts_used,
                temperature: policy.temperature_for(attempts_used),
                base_text: failure.recovered_prefix.clone(),
                rollback: Some(request.rollback_mode),
            };
            failure = match self.stream_attempt(system, &prompt, &attempt).await {
                AttemptOutcome::Completed | AttemptOutcome::Cancelled => {
                    return self.emit.status(RunStatus::Stopped);
                }
                AttemptOutcome::Failed(failure) => failure,
            };
        }

        self.fail(failure.reason);
    }

    #[instrument(skip_all, fields(attempt = attempt.index, temperature = attempt.temperature))]
    async fn stream_attempt(
        &mut self,
        system: &str,
        prompt: &str,
        attempt: &Attempt,
    ) -> AttemptOutcome {
        let request = GenerationRequest {
            system: system.to_string(),
            prompt: prompt.to_string(),
            sampling: SamplingParams::with_temperature(attempt.temperature),
        };
        let mut acc = attempt.base_text.clone();
        self.emit.text(&acc);
        info!(base_chars = acc.chars().count(), "attempt started");

        let opened = tokio::select! {
            biased;
            () = self.token.cancelled() => return AttemptOutcome::Cancelled,
            opened = self.generator.stream(&request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) => return self.transport_failure(&attempt.base_text, &err),
        };

        let mut first = true;
        loop {
            let next = tokio::select! {
                biased;
                () = self.token.cancelled() => return AttemptOutcome::Cancelled,
                next = stream.next() => next,
            };
            let chunk = match next {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => return self.transport_failure(&attempt.base_text, &err),
            };
            let piece = if first {
                first = false;
                join_continuation(&attempt.base_text, &chunk)
            } else {
                chunk.as_str()
            };
            acc.push_str(piece);
            self.emit.text(&acc);

            if !self.should_validate(&acc) {
                continue;
            }
            if let Some(reason) = self.violation_reason(&acc) {
                // Dropping the stream aborts the request.
                drop(stream);
                return AttemptOutcome::Failed(self.recover(acc, reason, attempt.rollback));
            }
        }

        let family = self.request.constraint.family();
        if !family.checks_while_streaming() {
            // Whole-text rules are judged once, on the finished text.
            if let Some(reason) = self.violation_reason(&acc) {
                return AttemptOutcome::Failed(self.reject_whole(acc, reason));
            }
        } else if family.is_word_based()
            && !ends_with_boundary(&acc)
            && let Some(reason) = self.violation_reason(&acc)
        {
            // Word-based rules skip the trailing word while streaming.
            return AttemptOutcome::Failed(self.recover(acc, reason, attempt.rollback));
        }

        info!(chars = acc.chars().count(), "attempt completed");
        AttemptOutcome::Completed
    }

    fn should_validate(&self, acc: &str) -> bool {
        let family = self.request.constraint.family();
        if !family.checks_while_streaming() {
            return false;
        }
        !family.is_word_based() || acc.is_empty() || ends_with_boundary(acc)
    }

    fn violation_reason(&self, acc: &str) -> Option<String> {
        let validation = self.request.constraint.validate(acc, self.request.param);
        debug!(
            chars = acc.chars().count(),
            valid = validation.valid,
            "validated"
        );
        validation.reason_in(self.request.lang)
    }

    /// Roll back to the last clean boundary and report the violation.
    fn recover(
        &mut self,
        full_text: String,
        reason: String,
        rollback: Option<RollbackMode>,
    ) -> AttemptFailure {
        let request = self.request;
        let last_ok = longest_valid_prefix(&full_text, request.constraint, request.param);
        let snapped = snap_to_word_boundary(&full_text[..last_ok]);
        let recovered_prefix = match rollback {
            None => snapped,
            Some(RollbackMode::Word) => remove_last_word(&snapped),
            Some(RollbackMode::Sentence) => remove_last_sentence(&snapped),
        };
        let highlight = find_word_bounds(&full_text, last_ok);
        warn!(
            %reason,
            valid_chars = full_text[..last_ok].chars().count(),
            prefix_chars = recovered_prefix.chars().count(),
            "constraint violated"
        );
        self.report(full_text, recovered_prefix, reason, highlight)
    }

    /// A whole-text rule failed: no prefix of the text is worth keeping.
    fn reject_whole(&mut self, full_text: String, reason: String) -> AttemptFailure {
        warn!(%reason, chars = full_text.chars().count(), "finished text rejected");
        self.report(full_text, String::new(), reason, 0..0)
    }

    fn report(
        &mut self,
        full_text: String,
        recovered_prefix: String,
        reason: String,
        highlight: Range<usize>,
    ) -> AttemptFailure {
        self.emit.violation(ViolationReport {
            full_text: full_text.clone(),
            recovered_prefix: recovered_prefix.clone(),
            reason: reason.clone(),
            highlight,
        });
        if self.config.truncate_on_violation {
            self.emit.text(&recovered_prefix);
        } else {
            self.emit.text(&full_text);
        }

        AttemptFailure {
            full_text,
            recovered_prefix,
            reason,
        }
    }

    /// The request or stream failed: the attempt ends, nothing is rolled back.
    fn transport_failure(&mut self, base_text: &str, err: &anyhow::Error) -> AttemptOutcome {
        warn!(error = %format!("{err:#}"), "generator transport failed");
        AttemptOutcome::Failed(AttemptFailure {
            full_text: base_text.to_string(),
            recovered_prefix: base_text.to_string(),
            reason: format!("{err:#}"),
        })
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.emit.error(Some(message));
        self.emit.status(RunStatus::Failed);
        self.emit.attempt(None);
    }
}
