use std::collections::HashMap;

/// Symmetric string similarity in `[0, 1]`.
///
/// The matcher's acceptance threshold is calibrated against [`DiceBigram`]; a different metric
/// changes which spans are accepted.
pub trait SimilarityMetric: Send + Sync {
    fn compare(&self, a: &str, b: &str) -> f64;
}

/// Dice coefficient over character bigrams.
///
/// Whitespace is removed before bigrams are built. Identical strings (including two empty
/// ones) score 1, and a string with fewer than two characters scores 0 against anything
/// else. Shared bigrams are counted as a multiset intersection:
/// `2 * |shared| / (|bigrams(a)| + |bigrams(b)|)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiceBigram;

impl SimilarityMetric for DiceBigram {
    fn compare(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
        let b: Vec<char> = b.chars().filter(|c| !c.is_whitespace()).collect();

        if a == b {
            return 1.0;
        }
        if a.len() < 2 || b.len() < 2 {
            return 0.0;
        }

        let mut a_bigrams: HashMap<(char, char), usize> = HashMap::with_capacity(a.len());
        for pair in a.windows(2) {
            *a_bigrams.entry((pair[0], pair[1])).or_insert(0) += 1;
        }

        let mut shared = 0usize;
        for pair in b.windows(2) {
            if let Some(count) = a_bigrams.get_mut(&(pair[0], pair[1])) {
                if *count > 0 {
                    *count -= 1;
                    shared += 1;
                }
            }
        }

        (2 * shared) as f64 / (a.len() + b.len() - 2) as f64
    }
}

/// Compare with the default metric.
pub fn similarity(a: &str, b: &str) -> f64 {
    DiceBigram.compare(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_and_empty_strings_score_one() {
        assert_eq!(similarity("hello", "hello"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("a", "a"), 1.0);
    }

    #[test]
    fn short_strings_score_zero_against_others() {
        assert_eq!(similarity("a", "ab"), 0.0);
        assert_eq!(similarity("", "hello"), 0.0);
        assert_eq!(similarity("ab", "b"), 0.0);
    }

    #[test]
    fn whitespace_is_ignored() {
        assert_eq!(similarity("hello there", "hellothere"), 1.0);
        assert!(close(similarity("night", "nacht"), similarity("n i g h t", "nacht")));
    }

    #[test]
    fn known_values() {
        // ni ig gh ht vs na ac ch ht: one shared bigram out of eight.
        assert!(close(similarity("night", "nacht"), 0.25));
        // He el ll lo vs he el ll lo: three of four shared.
        assert!(close(similarity("Hello", "hello"), 0.75));
        assert!(close(similarity("france", "french"), 0.4));
    }

    #[test]
    fn repeated_bigrams_count_as_multiset() {
        // Three "aa" against two: only two can be shared.
        assert!(close(similarity("aaaa", "aaa"), 2.0 * 2.0 / 5.0));
        assert!(close(similarity("aaa", "aaaa"), similarity("aaaa", "aaa")));
    }

    #[test]
    fn symmetric_and_bounded() {
        let samples = ["she said", "hello there.", "how are you?", "x", "", "aaaa"];
        for a in samples {
            for b in samples {
                let ab = similarity(a, b);
                assert!(close(ab, similarity(b, a)), "{a:?} vs {b:?}");
                assert!((0.0..=1.0).contains(&ab));
            }
        }
    }
}
