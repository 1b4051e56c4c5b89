//! Boundary repair for a matched span.
//!
//! A sliding-window match rarely lands exactly on the written sentence: it may stop just
//! short of a closing quote, or run past a full stop into the next sentence. The rules here
//! nudge `[start, end)` (character offsets into the raw text) using only a few characters of
//! context on either side.

use std::ops::Range;

/// How far left of the start an opening mark may be pulled in.
const LEFT_CONTEXT: usize = 10;
/// How far right of the end a closing mark may be pulled in.
const CLOSING_CONTEXT: usize = 5;
/// How far right of the end a sentence terminator may be pulled in.
const TERMINATOR_CONTEXT: usize = 15;

/// Searched in this order; the first mark present in the context wins.
const OPENING: [char; 7] = ['"', '\u{201C}', '(', '[', '{', '\u{2019}', '\u{AB}'];
const CLOSING: [char; 9] = [
    '"', '\u{201D}', ')', ']', '}', '\u{2019}', '\u{BB}', ':', ';',
];
const TERMINATORS: [char; 3] = ['.', '!', '?'];

pub fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

/// Refine `[start, end)` within `text`.
///
/// Returns `None` when the input range is empty or out of bounds.
pub fn refine(text: &[char], start: usize, end: usize) -> Option<Range<usize>> {
    if start >= end || end > text.len() {
        return None;
    }

    let matched_from = start;
    let mut start = start;
    let mut end = end;

    // Pull in an opening mark sitting just before the match, but never one that belongs to
    // an earlier sentence.
    let mut left_from = start.saturating_sub(LEFT_CONTEXT);
    if let Some(pos) = text[left_from..start].iter().rposition(|&c| is_terminator(c)) {
        left_from += pos + 1;
    }
    let left = &text[left_from..start];
    if let Some(pos) = OPENING
        .iter()
        .find_map(|mark| left.iter().rposition(|c| c == mark))
    {
        start = left_from + pos;
    }

    // A real sentence ending inside the matched text wins over every right-side rule.
    if let Some(pos) = first_inner_sentence_end(&text[matched_from..end]) {
        return Some(start..matched_from + pos + 1);
    }

    let right = &text[end..text.len().min(end + TERMINATOR_CONTEXT)];
    if let Some(pos) = CLOSING.iter().find_map(|mark| {
        right
            .iter()
            .position(|c| c == mark)
            .filter(|&pos| pos < CLOSING_CONTEXT)
    }) {
        end += pos + 1;
    } else if !is_terminator(text[end - 1]) {
        // A match already ending in a terminator is a complete sentence.
        if let Some(pos) = TERMINATORS
            .iter()
            .find_map(|mark| right.iter().position(|c| c == mark))
        {
            end += pos + 1;
        }
    }

    Some(start..end)
}

/// Refine `[start, end)` (character offsets) and return the refined text.
///
/// Invalid ranges yield an empty string.
pub fn optimize(text: &str, start: usize, end: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    match refine(&chars, start, end) {
        Some(range) => chars[range].iter().collect(),
        None => String::new(),
    }
}

/// Position of the first terminator that ends a sentence before the last character.
///
/// A terminator counts when it is followed by a space, a quote, or a newline; this skips
/// decimal points and most abbreviations. A terminator in last position is not a truncation
/// point because the match already ends there.
fn first_inner_sentence_end(matched: &[char]) -> Option<usize> {
    let last = matched.len().checked_sub(1)?;
    (0..last).find(|&i| {
        is_terminator(matched[i]) && matches!(matched[i + 1], ' ' | '"' | '\u{201D}' | '\n')
    })
}
