//! Text canonicalization used before every similarity comparison.
//!
//! Normalization lower-cases, collapses whitespace runs to a single space, and trims both
//! ends. Because collapsing and trimming change the character count, [`NormalizedText`]
//! keeps an explicit map from each normalized character back to the raw text; match offsets
//! are translated through it rather than assumed to line up.

/// Normalize `text` for comparison.
pub fn normalize(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    NormalizedText::from_chars(&chars).as_string()
}

/// Normalized characters plus, for each one, the index of the raw character it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    chars: Vec<char>,
    origin: Vec<usize>,
}

impl NormalizedText {
    pub fn from_chars(raw: &[char]) -> Self {
        let mut chars = Vec::with_capacity(raw.len());
        let mut origin = Vec::with_capacity(raw.len());
        let mut pending_space: Option<usize> = None;

        for (idx, &c) in raw.iter().enumerate() {
            if c.is_whitespace() {
                // Only the first character of a run is kept, and only once text follows it.
                pending_space.get_or_insert(idx);
                continue;
            }
            if let Some(space_idx) = pending_space.take() {
                if !chars.is_empty() {
                    chars.push(' ');
                    origin.push(space_idx);
                }
            }
            for lower in c.to_lowercase() {
                chars.push(lower);
                origin.push(idx);
            }
        }

        Self { chars, origin }
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }

    /// Normalized characters `[start, end)` as a string.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    /// Translate a normalized half-open range into raw character offsets.
    ///
    /// Returns `None` for empty or out-of-bounds ranges.
    pub fn raw_range(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        if start >= end || end > self.chars.len() {
            return None;
        }
        Some((self.origin[start], self.origin[end - 1] + 1))
    }
}
