//! Character classes, normalization and counting shared by constraints,
//! rollback and the word-by-word protocol.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// A word: letters/digits, optionally joined by inner hyphens.
/// Apostrophes separate words (`l'été` is two words).
pub static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+(?:-[\p{L}\p{N}]+)*").unwrap());

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

/// Characters that end a word while streaming.
pub fn is_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '-') || is_elision_mark(c)
}

/// Quotes and apostrophes; text ending on one continues without a space.
pub fn is_elision_mark(c: char) -> bool {
    matches!(c, '"' | '\'' | '’')
}

pub fn ends_with_boundary(text: &str) -> bool {
    text.chars().next_back().is_some_and(is_boundary)
}

pub fn ends_with_elision(text: &str) -> bool {
    text.chars().next_back().is_some_and(is_elision_mark)
}

pub fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

/// Decompose and drop combining marks: `Éte` → `Ete`.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Lowercased, diacritic-free form every built-in rule compares against.
pub fn normalize(text: &str) -> String {
    strip_diacritics(&text.to_lowercase())
}

/// Letters of a single word as the length-sequence rule counts them.
///
/// Diacritics are stripped and only alphabetic characters count. An elided
/// prefix (`l'`, `qu'`) belongs to the previous token and is not counted.
pub fn word_letter_count(word: &str) -> usize {
    let word = word.rsplit(is_elision_mark).next().unwrap_or(word);
    strip_diacritics(word)
        .chars()
        .filter(|c| c.is_alphabetic())
        .count()
}

/// Unicode letters in the whole text (score unit).
pub fn count_letters(text: &str) -> usize {
    strip_diacritics(text)
        .chars()
        .filter(|c| c.is_alphabetic())
        .count()
}

/// Runs of letters/digits in the text (score unit for length sequences).
pub fn count_words(text: &str) -> usize {
    TOKEN_RE.find_iter(text).count()
}

/// First run of letters/digits of a raw model answer, NFC-composed so that
/// decomposed accents stay inside the word.
pub fn first_word(raw: &str) -> Option<String> {
    let composed: String = raw.nfc().collect();
    TOKEN_RE.find(&composed).map(|m| m.as_str().to_string())
}

/// Words as the built-in rules see them, in order.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    WORD_RE.find_iter(text).map(|m| m.as_str())
}

/// Last `n` characters of `text`.
pub fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    let skip = count.saturating_sub(n);
    text.char_indices()
        .nth(skip)
        .map_or("", |(idx, _)| &text[idx..])
}

/// Characters `[from, from + n)` of `text`, clamped.
pub fn char_window(text: &str, from: usize, n: usize) -> String {
    text.chars().skip(from).take(n).collect()
}
