//! Word-by-word generation for length-sequence constraints.
//!
//! Free streaming cannot count letters ahead, so each word is requested on
//! its own and accepted only when its letter count is exactly one more than
//! the previous word's. The first word has two letters.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::text::{ends_with_elision, ends_with_whitespace, first_word, word_letter_count};
use crate::core::types::{Lang, RunStatus, VersusGoal, ViolationReport};
use crate::io::generator::{GenerationRequest, SamplingParams, TextGenerator};
use crate::io::prompt::NextWordPromptInput;
use crate::runner::Session;

const FIRST_WORD_LETTERS: usize = 2;

/// Letters required for the next word.
pub fn next_target(last_letters: Option<usize>) -> usize {
    last_letters.map_or(FIRST_WORD_LETTERS, |n| n + 1)
}

/// Append `word`, separated by a space unless the text is empty or ends on
/// whitespace or an elision mark.
pub fn append_word(text: &mut String, word: &str) {
    if !text.is_empty() && !ends_with_whitespace(text) && !ends_with_elision(text) {
        text.push(' ');
    }
    text.push_str(word);
}

fn exhausted_message(lang: Lang, word_number: usize, letters: usize, tries: u32) -> String {
    match lang {
        Lang::Fr => format!(
            "Impossible de trouver le mot {word_number} avec exactement {letters} lettres après {tries} essais."
        ),
        Lang::En => format!(
            "Could not find word {word_number} with exactly {letters} letters after {tries} tries."
        ),
    }
}

#[instrument(skip_all, fields(constraint = session.request.constraint.id()))]
pub(crate) async fn generate<G: TextGenerator>(session: &mut Session<'_, G>, system: &str) {
    let request = *session.request;
    let config = session.config;
    let prompts = session.prompts;
    let generator = session.generator;
    let cfg = &config.word_by_word;
    let max_words = match request.goal {
        Some(VersusGoal::Words(n)) if n > 0 => n + 1,
        _ => cfg.max_words,
    };

    let mut text = String::new();
    let mut last_letters: Option<usize> = None;

    for word_number in 1..=max_words {
        let target = next_target(last_letters);
        let mut rejected: Vec<String> = Vec::new();
        let mut accepted: Option<String> = None;

        for try_number in 1..=cfg.max_tries_per_word {
            let prompt = match prompts.next_word(&NextWordPromptInput {
                lang: request.lang,
                text: &text,
                word_number,
                letters: target,
                rejected: &rejected,
            }) {
                Ok(prompt) => prompt,
                Err(err) => return session.fail(format!("{err:#}")),
            };
            let word_request = GenerationRequest {
                system: system.to_string(),
                prompt,
                sampling: SamplingParams {
                    temperature: cfg.temperature,
                    max_tokens: Some(cfg.max_tokens),
                    stop: cfg.stop.clone(),
                },
            };

            let answer = tokio::select! {
                biased;
                () = session.token.cancelled() => return session.emit.status(RunStatus::Stopped),
                answer = generator.complete(&word_request) => answer,
            };
            let raw = match answer {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), word_number, "word request failed");
                    return session.fail(format!("{err:#}"));
                }
            };

            let candidate = first_word(&raw).unwrap_or_default();
            let letters = word_letter_count(&candidate);
            if !candidate.is_empty() && letters == target {
                accepted = Some(candidate);
                break;
            }
            debug!(word_number, try_number, %candidate, letters, target, "candidate rejected");
            if !candidate.is_empty() {
                rejected.push(candidate);
            }
        }

        let Some(word) = accepted else {
            let message = exhausted_message(request.lang, word_number, target, cfg.max_tries_per_word);
            report_exhausted(session, &text, rejected.last().map(String::as_str), message);
            return;
        };

        append_word(&mut text, &word);
        session.emit.text(&text);
        last_letters = Some(target);
        info!(word_number, %word, letters = target, "word accepted");

        if cfg.pace_ms > 0 && word_number < max_words {
            tokio::select! {
                biased;
                () = session.token.cancelled() => return session.emit.status(RunStatus::Stopped),
                () = tokio::time::sleep(Duration::from_millis(cfg.pace_ms)) => {}
            }
        }
    }

    session.emit.status(RunStatus::Stopped);
}

/// Report the last rejected candidate as if it had been appended.
fn report_exhausted<G: TextGenerator>(
    session: &mut Session<'_, G>,
    text: &str,
    candidate: Option<&str>,
    message: String,
) {
    let mut full_text = text.to_string();
    let start = match candidate {
        Some(word) => {
            append_word(&mut full_text, word);
            full_text.len() - word.len()
        }
        None => full_text.len(),
    };
    let highlight = start..full_text.len();
    warn!(reason = %message, "no candidate matched the required letter count");

    session.emit.violation(ViolationReport {
        full_text: full_text.clone(),
        recovered_prefix: text.to_string(),
        reason: message.clone(),
        highlight,
    });
    if !session.config.truncate_on_violation {
        session.emit.text(&full_text);
    }
    session.fail(message);
}
