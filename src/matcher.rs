//! Approximate location of one transcript sentence inside the unconsumed block text.

use crate::boundary;
use crate::normalize::NormalizedText;
use crate::similarity::{DiceBigram, SimilarityMetric};

/// Minimum score for a match to be accepted.
pub const ACCEPT_THRESHOLD: f64 = 0.6;

/// Score reported when a sentence longer than the remaining text does not match it.
///
/// This is a fixed low-confidence marker, not a measured similarity.
pub const LOW_CONFIDENCE_SCORE: f64 = 0.4;

/// Outcome of [`SentenceMatcher::find_best_match`].
///
/// `start` and `end` are character offsets into the raw remainder after boundary repair.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub score: f64,
    pub start: usize,
    pub end: usize,
    pub matched_text: Option<String>,
}

impl MatchOutcome {
    fn rejected(score: f64) -> Self {
        Self {
            score,
            start: 0,
            end: 0,
            matched_text: None,
        }
    }

    /// Matched text when the score clears [`ACCEPT_THRESHOLD`].
    pub fn accepted_text(&self) -> Option<&str> {
        if self.score < ACCEPT_THRESHOLD {
            return None;
        }
        self.matched_text.as_deref().filter(|text| !text.is_empty())
    }
}

/// Best window found by the sliding search, in normalized offsets.
#[derive(Debug, Clone, Copy, Default)]
struct Window {
    score: f64,
    start: usize,
    end: usize,
}

/// Multi-window sliding matcher.
///
/// The matcher is a pure function of its inputs and the metric.
#[derive(Debug, Clone, Default)]
pub struct SentenceMatcher<M: SimilarityMetric = DiceBigram> {
    metric: M,
}

impl SentenceMatcher<DiceBigram> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M: SimilarityMetric> SentenceMatcher<M> {
    pub fn with_metric(metric: M) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// Find the span of `remainder` that best matches `sentence`.
    pub fn find_best_match(&self, sentence: &str, remainder: &str) -> MatchOutcome {
        let chars: Vec<char> = remainder.chars().collect();
        self.find_best_match_chars(sentence, &chars)
    }

    /// [`find_best_match`](Self::find_best_match) over an already split remainder.
    pub fn find_best_match_chars(&self, sentence: &str, remainder: &[char]) -> MatchOutcome {
        let sentence_chars: Vec<char> = sentence.chars().collect();
        let sentence = NormalizedText::from_chars(&sentence_chars);
        let target = NormalizedText::from_chars(remainder);

        if sentence.is_empty() || target.is_empty() {
            return MatchOutcome::rejected(0.0);
        }

        if sentence.len() > target.len() {
            return self.match_whole_remainder(&sentence, &target, remainder);
        }

        let best = self.sliding_search(&sentence, &target);
        let Some((raw_start, raw_end)) = target.raw_range(best.start, best.end) else {
            return MatchOutcome::rejected(best.score);
        };

        match boundary::refine(remainder, raw_start, raw_end) {
            Some(range) => MatchOutcome {
                score: best.score,
                start: range.start,
                end: range.end,
                matched_text: Some(remainder[range].iter().collect()),
            },
            None => MatchOutcome::rejected(best.score),
        }
    }

    /// A sentence longer than the remaining text can at best consume all of it.
    fn match_whole_remainder(
        &self,
        sentence: &NormalizedText,
        target: &NormalizedText,
        remainder: &[char],
    ) -> MatchOutcome {
        let prefix = sentence.slice(0, target.len());
        let score = self.metric.compare(&prefix, &target.as_string());
        if score < ACCEPT_THRESHOLD {
            return MatchOutcome::rejected(LOW_CONFIDENCE_SCORE);
        }
        // The remainder minus surrounding whitespace.
        match target.raw_range(0, target.len()) {
            Some((start, end)) => MatchOutcome {
                score,
                start,
                end,
                matched_text: Some(remainder[start..end].iter().collect()),
            },
            None => MatchOutcome::rejected(score),
        }
    }

    /// Slide every candidate window size over the target.
    ///
    /// The first window (size order, then ascending offset) reaching the maximum wins; later
    /// ties never replace it.
    fn sliding_search(&self, sentence: &NormalizedText, target: &NormalizedText) -> Window {
        let needle = sentence.as_string();
        let len = sentence.len();
        let sizes = [
            len,
            len + 5,
            len + 10,
            (len as f64 * 1.2).round() as usize,
        ];

        let mut best = Window::default();
        for size in sizes {
            if size == 0 || size > target.len() {
                continue;
            }
            let mut local = Window::default();
            for start in 0..=target.len() - size {
                let candidate = target.slice(start, start + size);
                let score = self.metric.compare(&needle, &candidate);
                if score > local.score {
                    local = Window {
                        score,
                        start,
                        end: start + size,
                    };
                }
            }
            tracing::trace!(
                window = size,
                score = local.score,
                start = local.start,
                end = local.end,
                "window best"
            );
            if local.score > best.score {
                best = local;
            }
        }
        best
    }
}
