//! Boundary-aware rollback of a valid prefix.
//!
//! A retry continues from the text these helpers return, so every result is
//! either empty or ends where a new word can start: on whitespace or on an
//! elision mark (`l'`, opening quote).

use std::ops::Range;

use crate::core::text::{ends_with_elision, ends_with_whitespace, is_boundary, is_elision_mark};

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

/// Keep elision and whitespace endings, otherwise append one space.
fn with_open_tail(text: &str) -> String {
    if ends_with_elision(text) || ends_with_whitespace(text) {
        text.to_string()
    } else {
        format!("{text} ")
    }
}

/// Drop a partially written word: cut right after the last boundary char.
pub fn snap_to_word_boundary(prefix: &str) -> String {
    let Some((idx, c)) = prefix.char_indices().rev().find(|(_, c)| is_boundary(*c)) else {
        return String::new();
    };
    let rolled = &prefix[..idx + c.len_utf8()];
    if rolled.trim().is_empty() {
        return String::new();
    }
    with_open_tail(rolled)
}

/// Remove the last complete word, keeping words of two characters or less.
pub fn remove_last_word(prefix: &str) -> String {
    let end = prefix.trim_end_matches(is_boundary).len();
    if end == 0 {
        return String::new();
    }
    let body = &prefix[..end];
    let start = body
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric())
        .last()
        .map_or(end, |(idx, _)| idx);
    let word = &body[start..];
    if word.is_empty() {
        return String::new();
    }
    if word.chars().count() <= 2 {
        return with_open_tail(prefix);
    }
    let head = &prefix[..start];
    if head.trim().is_empty() {
        return String::new();
    }
    with_open_tail(head)
}

/// Remove the last sentence, cutting after the previous terminator or newline.
pub fn remove_last_sentence(prefix: &str) -> String {
    let body = prefix.trim_end_matches(|c: char| c.is_whitespace() || is_terminal(c));
    if body.is_empty() {
        return String::new();
    }
    let Some((idx, c)) = body
        .char_indices()
        .rev()
        .find(|(_, c)| *c == '\n' || is_terminal(*c))
    else {
        return String::new();
    };
    let head = &body[..idx + c.len_utf8()];
    if head.trim().is_empty() {
        return String::new();
    }
    with_open_tail(head)
}

/// Byte span of the token at or just after `index`.
///
/// Boundary characters at `index` are skipped to the right; at the end of the
/// text the search falls back to the left. Empty text yields `0..0`.
pub fn find_word_bounds(text: &str, index: usize) -> Range<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    if chars.is_empty() {
        return 0..0;
    }
    let n = chars.len();
    let at = chars.partition_point(|(b, _)| *b < index).min(n - 1);

    let mut pivot = at;
    while pivot < n && is_boundary(chars[pivot].1) {
        pivot += 1;
    }
    if pivot >= n {
        pivot = at;
        while pivot > 0 && is_boundary(chars[pivot].1) {
            pivot -= 1;
        }
    }

    let mut start = pivot;
    while start > 0 && !is_boundary(chars[start - 1].1) {
        start -= 1;
    }
    let mut end = pivot;
    while end < n && !is_boundary(chars[end].1) {
        end += 1;
    }

    let byte = |pos: usize| chars.get(pos).map_or(text.len(), |(b, _)| *b);
    byte(start)..byte(end)
}

/// First chunk of a continuation, trimmed so it joins `base` cleanly.
///
/// Leading whitespace is dropped after a base ending in whitespace; after an
/// elision mark, repeated quotes and apostrophes are dropped as well.
pub fn join_continuation<'a>(base: &str, chunk: &'a str) -> &'a str {
    let mut chunk = chunk;
    if ends_with_whitespace(base) {
        chunk = chunk.trim_start();
    }
    if ends_with_elision(base) {
        chunk = chunk.trim_start().trim_start_matches(is_elision_mark);
    }
    chunk
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn snap_drops_partial_word() {
        assert_eq!(snap_to_word_boundary("Le chat mang"), "Le chat ");
        assert_eq!(snap_to_word_boundary("Le chat,"), "Le chat, ");
        assert_eq!(snap_to_word_boundary("Mot"), "");
        assert_eq!(snap_to_word_boundary("   "), "");
    }

    #[test]
    fn snap_keeps_elision_without_space() {
        assert_eq!(snap_to_word_boundary("Il dit l'ar"), "Il dit l'");
        assert_eq!(snap_to_word_boundary("Il dit l’"), "Il dit l’");
    }

    #[test]
    fn snap_accepts_hyphen_as_boundary() {
        assert_eq!(snap_to_word_boundary("arc-en-ci"), "arc-en- ");
    }

    #[test]
    fn remove_last_word_drops_long_words() {
        assert_eq!(remove_last_word("Le chat dort. "), "Le chat ");
        assert_eq!(remove_last_word("Bonjour "), "");
    }

    #[test]
    fn remove_last_word_keeps_short_words() {
        assert_eq!(remove_last_word("Le chat et "), "Le chat et ");
        assert_eq!(remove_last_word("Le chat et"), "Le chat et ");
    }

    #[test]
    fn remove_last_word_on_blank_is_empty() {
        assert_eq!(remove_last_word(" ,. "), "");
        assert_eq!(remove_last_word(""), "");
    }

    #[test]
    fn remove_last_sentence_cuts_after_previous_terminator() {
        assert_eq!(
            remove_last_sentence("Il pleut. Le chat dort. Puis il "),
            "Il pleut. Le chat dort. "
        );
        assert_eq!(remove_last_sentence("Il pleut. Le chat dort."), "Il pleut. ");
        assert_eq!(remove_last_sentence("Une seule phrase"), "");
    }

    #[test]
    fn remove_last_sentence_cuts_after_newline() {
        assert_eq!(remove_last_sentence("Titre\nLe texte"), "Titre\n");
    }

    #[test]
    fn remove_last_sentence_twice_removes_two_sentences() {
        let once = remove_last_sentence("A un. B deux. C trois.");
        assert_eq!(once, "A un. B deux. ");
        assert_eq!(remove_last_sentence(&once), "A un. ");
    }

    #[test]
    fn word_bounds_find_offending_word() {
        let text = "Ceci est un test";
        assert_eq!(find_word_bounds(text, 1), 0..4);
        assert_eq!(find_word_bounds(text, 4), 5..8);
    }

    #[test]
    fn word_bounds_fall_back_left_at_end() {
        let text = "Un mot. ";
        assert_eq!(find_word_bounds(text, text.len()), 3..6);
        assert_eq!(find_word_bounds("", 3), 0..0);
        assert_eq!(find_word_bounds(" .", 0), 0..0);
    }

    #[test]
    fn word_bounds_use_byte_offsets() {
        let text = "Où était";
        let span = find_word_bounds(text, 4);
        assert_eq!(&text[span], "était");
    }

    #[test]
    fn join_trims_leading_whitespace_after_space() {
        assert_eq!(join_continuation("Le chat ", "  dort"), "dort");
        assert_eq!(join_continuation("Le chat", " dort"), " dort");
    }

    #[test]
    fn join_drops_repeated_apostrophe_after_elision() {
        assert_eq!(join_continuation("Il dit l'", " 'arbre"), "arbre");
        assert_eq!(join_continuation("« Il dit \"", "\"Oui"), "Oui");
    }

    fn ends_cleanly(s: &str) -> bool {
        s.is_empty() || ends_with_whitespace(s) || ends_with_elision(s)
    }

    proptest! {
        #[test]
        fn snap_result_is_prefix_with_clean_tail(text in "[a-zé .,'\n]{0,40}") {
            let snapped = snap_to_word_boundary(&text);
            prop_assert!(ends_cleanly(&snapped));
            let core = snapped.trim_end_matches(' ');
            prop_assert!(text.starts_with(core));
        }

        #[test]
        fn remove_last_word_never_grows(text in "[a-z .,!?]{0,40}") {
            let removed = remove_last_word(&text);
            prop_assert!(ends_cleanly(&removed));
            prop_assert!(removed.trim_end().len() <= text.trim_end().len());
        }

        #[test]
        fn remove_last_sentence_never_grows(text in "[a-z .!?\n]{0,40}") {
            let removed = remove_last_sentence(&text);
            prop_assert!(ends_cleanly(&removed));
            prop_assert!(text.starts_with(removed.trim_end_matches(' ')));
        }
    }
}
