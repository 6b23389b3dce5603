//! One-shot validation of a finished text (`machine check`).

use std::ops::Range;

use serde::Serialize;

use crate::core::constraint::Constraint;
use crate::core::prefix::longest_valid_prefix;
use crate::core::rollback::find_word_bounds;
use crate::core::text::{count_letters, count_words};
use crate::core::types::Lang;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub constraint: &'static str,
    pub valid: bool,
    /// In the requested language.
    pub reason: Option<String>,
    pub note: Option<String>,
    /// Longest prefix that still satisfies the constraint.
    pub valid_prefix: String,
    /// Byte span of the offending token, when invalid.
    pub highlight: Option<Range<usize>>,
    pub letters: usize,
    pub words: usize,
}

pub fn check_text(constraint: &dyn Constraint, param: &str, text: &str, lang: Lang) -> CheckReport {
    let validation = constraint.validate(text, param);
    let (valid_prefix, highlight) = if validation.valid {
        (text.to_string(), None)
    } else if constraint.family().checks_while_streaming() {
        let last_ok = longest_valid_prefix(text, constraint, param);
        (
            text[..last_ok].to_string(),
            Some(find_word_bounds(text, last_ok)),
        )
    } else {
        // Whole-text rules have no meaningful prefix.
        (String::new(), None)
    };
    CheckReport {
        constraint: constraint.id(),
        valid: validation.valid,
        reason: validation.reason_in(lang),
        note: validation.note,
        letters: count_letters(&valid_prefix),
        words: count_words(&valid_prefix),
        valid_prefix,
        highlight,
    }
}
