//! Truncation helpers for titles, previews and citation excerpts

use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

/// Ellipsis appended when text is cut
pub const ELLIPSIS: &str = "...";

/// Unit in which a truncation limit is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleUnit {
    /// Unicode scalar values
    #[default]
    Chars,
    /// Terminal display columns
    Width,
}

/// Truncates `text` to at most `max` units, appending [`ELLIPSIS`] when cut
///
/// The ellipsis is not counted against `max`. Truncation never splits a
/// character.
///
/// # Examples
///
/// ```
/// use docuchat::text::{truncate_with_ellipsis, TitleUnit};
///
/// assert_eq!(truncate_with_ellipsis("Summarize chapter 1", 50, TitleUnit::Chars), "Summarize chapter 1");
/// assert_eq!(truncate_with_ellipsis("abcdef", 3, TitleUnit::Chars), "abc...");
/// ```
pub fn truncate_with_ellipsis(text: &str, max: usize, unit: TitleUnit) -> String {
    let cut = match unit {
        TitleUnit::Chars => text.char_indices().nth(max).map(|(idx, _)| idx),
        TitleUnit::Width => width_cut(text, max),
    };

    match cut {
        Some(idx) => format!("{}{}", text[..idx].trim_end(), ELLIPSIS),
        None => text.to_string(),
    }
}

/// Byte index at which `text` exceeds `max` display columns, if it does
fn width_cut(text: &str, max: usize) -> Option<usize> {
    let mut used = 0;
    for (idx, ch) in text.char_indices() {
        used += ch.width().unwrap_or(0);
        if used > max {
            return Some(idx);
        }
    }
    None
}

/// Collapses internal whitespace so multi-line content fits on one line
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
