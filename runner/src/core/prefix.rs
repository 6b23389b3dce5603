//! Longest valid prefix search.

use crate::core::constraint::Constraint;

/// Byte length of the longest prefix of `text` that `constraint` accepts.
///
/// Binary search over character boundaries, so the returned index always
/// slices cleanly. Assumes the predicate is monotonic; for constraints that
/// are not, the answer is a conservative valid prefix rather than the longest.
pub fn longest_valid_prefix(text: &str, constraint: &dyn Constraint, param: &str) -> usize {
    longest_valid_prefix_by(text, |prefix| constraint.validate(prefix, param).valid)
}

/// Same search over an arbitrary predicate.
pub fn longest_valid_prefix_by(text: &str, mut is_valid: impl FnMut(&str) -> bool) -> usize {
    if text.is_empty() {
        return 0;
    }
    if is_valid(text) {
        return text.len();
    }

    // cuts[k] is the byte offset after k characters.
    let cuts: Vec<usize> = text
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut lo = 0;
    let mut hi = cuts.len() - 1;
    while lo < hi {
        let mid = (lo + hi).div_ceil(2);
        if is_valid(&text[..cuts[mid]]) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    cuts[lo]
}
