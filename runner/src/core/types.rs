//! Shared deterministic types for the runner.
//!
//! These types define stable contracts between core components, the runner
//! and its observers. They must not depend on external state or I/O.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Ready,
    Running,
    /// Generation ended cleanly or was stopped by the user.
    Stopped,
    /// A violation could not be recovered, or the transport failed.
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Normal,
    /// Bounded retries from the recovered prefix, conservative sampling.
    Hard,
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "hard" => Ok(Self::Hard),
            other => bail!("unknown difficulty {other:?} (expected normal or hard)"),
        }
    }
}

/// How much valid text a retry gives up before continuing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackMode {
    #[default]
    Word,
    Sentence,
}

impl FromStr for RollbackMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "word" => Ok(Self::Word),
            "sentence" => Ok(Self::Sentence),
            other => bail!("unknown rollback mode {other:?} (expected word or sentence)"),
        }
    }
}

/// Output language of prompts and user-facing messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Fr,
    En,
}

impl Lang {
    pub fn code(self) -> &'static str {
        match self {
            Self::Fr => "fr",
            Self::En => "en",
        }
    }
}

impl FromStr for Lang {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fr" => Ok(Self::Fr),
            "en" => Ok(Self::En),
            other => bail!("unknown language {other:?} (expected fr or en)"),
        }
    }
}

/// Attempt progress as shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptInfo {
    /// 1-based attempt index.
    pub attempt: u32,
    pub max: u32,
    pub retrying: bool,
}

/// One sequential generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub index: u32,
    pub temperature: f32,
    /// Empty for the first attempt, the recovered prefix for retries.
    pub base_text: String,
    /// Extra rollback applied after snapping to a word boundary.
    /// `None` on the first attempt.
    pub rollback: Option<RollbackMode>,
}

/// Evidence of a constraint violation, produced once per failed attempt.
///
/// `highlight` is a byte range into `full_text` covering the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub full_text: String,
    pub recovered_prefix: String,
    pub reason: String,
    pub highlight: Range<usize>,
}

impl ViolationReport {
    /// Offending token, or an empty string when the span is empty.
    pub fn highlighted(&self) -> &str {
        self.full_text.get(self.highlight.clone()).unwrap_or_default()
    }
}

/// Target the user wants to beat, passed through to the system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersusGoal {
    /// Output must be strictly longer than this many characters.
    Chars(usize),
    /// Output must reach at least this many words.
    Words(usize),
}
