use std::sync::LazyLock;

use regex::Regex;

// Letters/digits, with hyphens and apostrophes allowed between them ("don't", "well-known").
static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['\u{2019}-][\p{L}\p{N}]+)*").expect("valid word regex")
});

/// Split text into word tokens, dropping punctuation and whitespace.
pub fn words(text: &str) -> Vec<&str> {
    WORD.find_iter(text).map(|m| m.as_str()).collect()
}
