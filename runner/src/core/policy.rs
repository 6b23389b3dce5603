//! Attempt budget and sampling temperatures.

use crate::core::types::Difficulty;

/// Retry rules for one run, resolved from difficulty and configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptPolicy {
    pub difficulty: Difficulty,
    /// 1 in normal mode, the configured hard bound otherwise.
    pub max_attempts: u32,
    /// A retry is only worth it when the recovered prefix is shorter than this
    /// many characters; later failures keep what was written.
    pub early_failure_chars: usize,
    pub first_temperature: f32,
    pub retry_temperature: f32,
}

impl AttemptPolicy {
    pub fn new(
        difficulty: Difficulty,
        hard_max_attempts: u32,
        early_failure_chars: usize,
        temperature_normal: f32,
        temperature_hard: f32,
        temperature_retry: f32,
    ) -> Self {
        let (max_attempts, first_temperature) = match difficulty {
            Difficulty::Normal => (1, temperature_normal),
            Difficulty::Hard => (hard_max_attempts.max(1), temperature_hard),
        };
        Self {
            difficulty,
            max_attempts,
            early_failure_chars,
            first_temperature,
            retry_temperature: temperature_retry,
        }
    }

    /// Whether another attempt follows `attempts_used` failed ones whose last
    /// recovered prefix is `recovered_chars` characters long.
    pub fn should_retry(&self, attempts_used: u32, recovered_chars: usize) -> bool {
        self.difficulty == Difficulty::Hard
            && attempts_used < self.max_attempts
            && recovered_chars < self.early_failure_chars
    }

    pub fn temperature_for(&self, attempt: u32) -> f32 {
        if attempt <= 1 {
            self.first_temperature
        } else {
            self.retry_temperature
        }
    }
}
