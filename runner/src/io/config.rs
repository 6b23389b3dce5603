//! Runner configuration stored in `machine.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::AttemptPolicy;
use crate::core::types::{Difficulty, RollbackMode};

pub const DEFAULT_CONFIG_PATH: &str = "machine.toml";

/// Runner configuration (TOML).
///
/// Meant to be edited by humans. Missing fields fall back to the values the
/// runner was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Attempt bound in hard mode (normal mode always makes one attempt).
    pub hard_max_attempts: u32,

    /// Retry only while the recovered prefix is shorter than this many chars.
    pub early_failure_chars: usize,

    pub temperature_normal: f32,
    pub temperature_hard: f32,
    pub temperature_retry: f32,

    /// On a failed run, show the recovered prefix instead of the invalid text.
    pub truncate_on_violation: bool,

    /// Default rollback aggressiveness for retries.
    pub rollback_mode: RollbackMode,

    pub word_by_word: WordByWordConfig,
    pub generator: GeneratorConfig,
}

/// Per-word generation used by length-sequence constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WordByWordConfig {
    /// Words to generate when no versus goal is set.
    pub max_words: usize,
    pub max_tries_per_word: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Delay between accepted words.
    pub pace_ms: u64,
    pub stop: Vec<String>,
}

impl Default for WordByWordConfig {
    fn default() -> Self {
        Self {
            max_words: 12,
            max_tries_per_word: 7,
            temperature: 0.2,
            max_tokens: 8,
            pace_ms: 120,
            stop: vec!["\n".to_string(), ".".to_string(), ",".to_string()],
        }
    }
}

/// OpenAI-compatible Chat Completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. The key itself never lives
    /// in the config file.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            hard_max_attempts: 5,
            early_failure_chars: 140,
            temperature_normal: 0.7,
            temperature_hard: 0.3,
            temperature_retry: 0.25,
            truncate_on_violation: true,
            rollback_mode: RollbackMode::Word,
            word_by_word: WordByWordConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

fn check_temperature(name: &str, value: f32) -> Result<()> {
    if !(0.0..=2.0).contains(&value) {
        return Err(anyhow!("{name} must be within [0, 2] (got {value})"));
    }
    Ok(())
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hard_max_attempts == 0 {
            return Err(anyhow!("hard_max_attempts must be > 0"));
        }
        check_temperature("temperature_normal", self.temperature_normal)?;
        check_temperature("temperature_hard", self.temperature_hard)?;
        check_temperature("temperature_retry", self.temperature_retry)?;
        check_temperature("word_by_word.temperature", self.word_by_word.temperature)?;
        if self.word_by_word.max_words == 0 {
            return Err(anyhow!("word_by_word.max_words must be > 0"));
        }
        if self.word_by_word.max_tries_per_word == 0 {
            return Err(anyhow!("word_by_word.max_tries_per_word must be > 0"));
        }
        if self.word_by_word.max_tokens == 0 {
            return Err(anyhow!("word_by_word.max_tokens must be > 0"));
        }
        if self.word_by_word.stop.len() > 4 {
            return Err(anyhow!("word_by_word.stop accepts at most 4 markers"));
        }
        if self.generator.base_url.trim().is_empty() {
            return Err(anyhow!("generator.base_url must not be empty"));
        }
        if self.generator.model.trim().is_empty() {
            return Err(anyhow!("generator.model must not be empty"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn attempt_policy(&self, difficulty: Difficulty) -> AttemptPolicy {
        AttemptPolicy::new(
            difficulty,
            self.hard_max_attempts,
            self.early_failure_chars,
            self.temperature_normal,
            self.temperature_hard,
            self.temperature_retry,
        )
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("machine.toml");
        let mut cfg = RunnerConfig::default();
        cfg.rollback_mode = RollbackMode::Sentence;
        cfg.word_by_word.pace_ms = 0;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("machine.toml");
        fs::write(
            &path,
            "hard_max_attempts = 3\nrollback_mode = \"sentence\"\n\n[generator]\nmodel = \"local\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.hard_max_attempts, 3);
        assert_eq!(cfg.rollback_mode, RollbackMode::Sentence);
        assert_eq!(cfg.generator.model, "local");
        assert_eq!(cfg.generator.api_key_env, "OPENAI_API_KEY");
        assert_eq!(cfg.early_failure_chars, 140);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = RunnerConfig::default();
        cfg.temperature_retry = 3.0;
        let err = cfg.validate().expect_err("temperature");
        assert!(err.to_string().contains("temperature_retry"));

        let mut cfg = RunnerConfig::default();
        cfg.word_by_word.stop = vec![".".to_string(); 5];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn policy_uses_configured_bounds() {
        let mut cfg = RunnerConfig::default();
        cfg.hard_max_attempts = 2;
        let policy = cfg.attempt_policy(Difficulty::Hard);
        assert_eq!(policy.max_attempts, 2);
        assert!(policy.should_retry(1, 0));
        assert!(!policy.should_retry(2, 0));
    }
}
