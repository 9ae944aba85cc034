//! Text bounding helpers.
//!
//! Tool results and logged messages are bounded in bytes, never split inside
//! a UTF-8 character.

use std::borrow::Cow;

/// Longest prefix of `s` that fits in `max_bytes` and ends on a char boundary.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `text` unchanged when it fits, otherwise its bounded prefix followed by a
/// marker line saying how much was dropped.
///
/// Only the prefix counts against `max_bytes`; the marker is extra.
pub fn bounded(text: &str, max_bytes: usize) -> Cow<'_, str> {
    if text.len() <= max_bytes {
        return Cow::Borrowed(text);
    }
    let kept = truncate_str(text, max_bytes);
    Cow::Owned(format!(
        "{}\n[truncated {} of {} bytes]",
        kept,
        text.len() - kept.len(),
        text.len()
    ))
}
