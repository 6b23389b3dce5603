//! Prompt rendering for the generator.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;

use crate::core::constraint::{Constraint, ParamSpec};
use crate::core::text::{char_window, tail_chars};
use crate::core::types::{Difficulty, Lang, VersusGoal};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const START_TEMPLATE: &str = include_str!("prompts/start.md");
const RETRY_TEMPLATE: &str = include_str!("prompts/retry.md");
const NEXT_WORD_TEMPLATE: &str = include_str!("prompts/next_word.md");

/// Characters of context shown on each side of a failure.
pub const RETRY_CONTEXT_CHARS: usize = 120;

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

pub struct SystemPromptInput<'a> {
    pub lang: Lang,
    pub constraint: &'a dyn Constraint,
    pub param: &'a str,
    pub difficulty: Difficulty,
    pub steering: Option<&'a str>,
    pub goal: Option<VersusGoal>,
}

pub struct RetryPromptInput<'a> {
    pub lang: Lang,
    /// 2-based index of the attempt about to start.
    pub attempt: u32,
    pub max_attempts: u32,
    pub full_text: &'a str,
    pub recovered_prefix: &'a str,
    pub reason: &'a str,
}

pub struct NextWordPromptInput<'a> {
    pub lang: Lang,
    pub text: &'a str,
    /// 1-based position of the requested word.
    pub word_number: usize,
    pub letters: usize,
    pub rejected: &'a [String],
}

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("start", START_TEMPLATE)
            .expect("start template should be valid");
        env.add_template("retry", RETRY_TEMPLATE)
            .expect("retry template should be valid");
        env.add_template("next_word", NEXT_WORD_TEMPLATE)
            .expect("next_word template should be valid");
        Self { env }
    }

    pub fn system(&self, input: &SystemPromptInput<'_>) -> Result<String> {
        let param = match input.constraint.param_spec() {
            ParamSpec::None => "",
            _ => input.param.trim(),
        };
        let (min_chars, min_words) = match input.goal {
            Some(VersusGoal::Chars(n)) if n > 0 => (Some(n), None),
            Some(VersusGoal::Words(n)) if n > 0 => (None, Some(n)),
            _ => (None, None),
        };
        let rendered = self
            .env
            .get_template("system")?
            .render(context! {
                lang => input.lang.code(),
                hard => input.difficulty == Difficulty::Hard,
                name => input.constraint.name(input.lang),
                description => input.constraint.description(input.lang),
                param => param,
                steering => input.steering.map(str::trim).filter(|s| !s.is_empty()),
                min_chars => min_chars,
                min_words => min_words,
            })
            .context("render system prompt")?;
        Ok(tidy(&rendered))
    }

    pub fn start(&self, lang: Lang) -> Result<String> {
        let rendered = self
            .env
            .get_template("start")?
            .render(context! { lang => lang.code() })
            .context("render start prompt")?;
        Ok(tidy(&rendered))
    }

    pub fn retry(&self, input: &RetryPromptInput<'_>) -> Result<String> {
        let prefix_chars = input.recovered_prefix.chars().count();
        let rendered = self
            .env
            .get_template("retry")?
            .render(context! {
                lang => input.lang.code(),
                attempt => input.attempt,
                max_attempts => input.max_attempts,
                full_text => input.full_text,
                reason => input.reason,
                restart => prefix_chars == 0,
                prefix_chars => prefix_chars,
                before => tail_chars(input.recovered_prefix, RETRY_CONTEXT_CHARS),
                after => char_window(input.full_text, prefix_chars, RETRY_CONTEXT_CHARS),
            })
            .context("render retry prompt")?;
        Ok(tidy(&rendered))
    }

    pub fn next_word(&self, input: &NextWordPromptInput<'_>) -> Result<String> {
        let rendered = self
            .env
            .get_template("next_word")?
            .render(context! {
                lang => input.lang.code(),
                text => input.text.trim_end(),
                word_number => input.word_number,
                letters => input.letters,
                rejected => input.rejected,
            })
            .context("render next-word prompt")?;
        Ok(tidy(&rendered))
    }
}

fn tidy(rendered: &str) -> String {
    BLANK_RUNS.replace_all(rendered.trim(), "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{Lipogram, Snowball};

    fn system_input<'a>(constraint: &'a dyn Constraint) -> SystemPromptInput<'a> {
        SystemPromptInput {
            lang: Lang::Fr,
            constraint,
            param: "e",
            difficulty: Difficulty::Normal,
            steering: None,
            goal: None,
        }
    }

    #[test]
    fn system_prompt_names_constraint_and_parameter() {
        let prompts = PromptBuilder::new();
        let prompt = prompts.system(&system_input(&Lipogram)).expect("render");
        assert!(prompt.starts_with("You are La Machine"));
        assert!(prompt.contains("Language: French. Write in French."));
        assert!(prompt.contains("Constraint: Lipogramme — "));
        assert!(prompt.contains("Parameter: e"));
        assert!(!prompt.contains("Hard mode"));
        assert!(!prompt.contains("\n\n\n"));
    }

    #[test]
    fn system_prompt_omits_parameter_for_parameterless_constraint() {
        let prompts = PromptBuilder::new();
        let prompt = prompts.system(&system_input(&Snowball)).expect("render");
        assert!(!prompt.contains("Parameter:"));
    }

    #[test]
    fn system_prompt_carries_hard_mode_steering_and_goal() {
        let prompts = PromptBuilder::new();
        let mut input = system_input(&Lipogram);
        input.lang = Lang::En;
        input.difficulty = Difficulty::Hard;
        input.steering = Some("  about the sea  ");
        input.goal = Some(VersusGoal::Chars(180));
        let prompt = prompts.system(&input).expect("render");
        assert!(prompt.contains("Hard mode:"));
        assert!(prompt.contains("Language: English."));
        assert!(prompt.contains("User steering (follow it when compatible with the constraint):\nabout the sea"));
        assert!(prompt.contains("STRICTLY longer than 180 characters"));
        assert!(prompt.ends_with("180 characters."));
    }

    #[test]
    fn system_prompt_word_goal() {
        let prompts = PromptBuilder::new();
        let mut input = system_input(&Snowball);
        input.goal = Some(VersusGoal::Words(9));
        let prompt = prompts.system(&input).expect("render");
        assert!(prompt.contains("at least 9 words"));
    }

    #[test]
    fn start_prompt_follows_language() {
        let prompts = PromptBuilder::new();
        assert!(prompts.start(Lang::Fr).expect("fr").starts_with("Écris"));
        assert!(prompts.start(Lang::En).expect("en").starts_with("Write"));
    }

    #[test]
    fn retry_prompt_continues_from_prefix() {
        let prompts = PromptBuilder::new();
        let prompt = prompts
            .retry(&RetryPromptInput {
                lang: Lang::En,
                attempt: 2,
                max_attempts: 5,
                full_text: "Un chat mange",
                recovered_prefix: "Un chat ",
                reason: "forbidden letter detected: \"e\"",
            })
            .expect("render");
        assert!(prompt.starts_with("Attempt 2/5."));
        assert!(prompt.contains("\"\"\"\nUn chat mange\n\"\"\""));
        assert!(prompt.contains("Reason: forbidden letter detected: \"e\""));
        assert!(prompt.contains("ends at character 8"));
        assert!(prompt.contains("--- BEFORE (valid) ---\nUn chat \n--- AFTER (invalid) ---\nmange"));
        assert!(prompt.contains("1) Pick up exactly after the last valid prefix"));
        assert!(prompt.ends_with("Output ONLY the continuation to append."));
    }

    #[test]
    fn retry_prompt_restarts_when_nothing_survived() {
        let prompts = PromptBuilder::new();
        let prompt = prompts
            .retry(&RetryPromptInput {
                lang: Lang::Fr,
                attempt: 3,
                max_attempts: 5,
                full_text: "Ceci",
                recovered_prefix: "",
                reason: "lettre interdite",
            })
            .expect("render");
        assert!(prompt.starts_with("Tentative 3/5."));
        assert!(prompt.contains("Aucun préfixe valide"));
        assert!(prompt.contains("--- AVANT (valide) ---\n(vide)"));
        assert!(prompt.contains("1) Repars de ZÉRO"));
    }

    #[test]
    fn retry_context_is_bounded() {
        let prompts = PromptBuilder::new();
        let prefix = "a".repeat(300);
        let full = format!("{prefix}{}", "b".repeat(300));
        let prompt = prompts
            .retry(&RetryPromptInput {
                lang: Lang::En,
                attempt: 2,
                max_attempts: 5,
                full_text: &full,
                recovered_prefix: &prefix,
                reason: "r",
            })
            .expect("render");
        let expected = format!(
            "--- BEFORE (valid) ---\n{}\n--- AFTER (invalid) ---\n{}\n",
            "a".repeat(RETRY_CONTEXT_CHARS),
            "b".repeat(RETRY_CONTEXT_CHARS)
        );
        assert!(prompt.contains(&expected));
    }

    #[test]
    fn next_word_prompt_lists_rejected_candidates() {
        let prompts = PromptBuilder::new();
        let rejected = vec!["caron".to_string(), "pomme".to_string()];
        let prompt = prompts
            .next_word(&NextWordPromptInput {
                lang: Lang::En,
                text: "du thé ",
                word_number: 3,
                letters: 4,
                rejected: &rejected,
            })
            .expect("render");
        assert!(prompt.contains("\"\"\"\ndu thé\n\"\"\""));
        assert!(prompt.contains("Give word number 3. It must have EXACTLY 4 letters"));
        assert!(prompt.contains("do not suggest again: caron, pomme."));
    }

    #[test]
    fn next_word_prompt_without_rejections_skips_the_line() {
        let prompts = PromptBuilder::new();
        let prompt = prompts
            .next_word(&NextWordPromptInput {
                lang: Lang::Fr,
                text: "",
                word_number: 1,
                letters: 2,
                rejected: &[],
            })
            .expect("render");
        assert!(prompt.contains("(vide)"));
        assert!(!prompt.contains("refusés"));
    }
}
