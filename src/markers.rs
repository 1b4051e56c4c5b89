//! Alignment markers written into a block's `content`.
//!
//! After a run, every aligned span of the block is replaced by a `[[<sentence id>]]` marker so
//! renderers can substitute the linked sentence. A new run strips all of them first.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::SentenceId;

// A bracketed id: `[[` followed by anything but `]`, then `]]`.
static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[[^\]]+\]\]").expect("valid marker regex"));

/// Marker text for one aligned sentence.
pub fn marker(sentence_id: SentenceId) -> String {
    format!("[[{sentence_id}]]")
}

pub fn has_markers(content: &str) -> bool {
    MARKER.is_match(content)
}

pub fn strip_markers(content: &str) -> String {
    MARKER.replace_all(content, "").into_owned()
}

/// Build block content as prefix, one marker per aligned sentence in order, then leftover text.
pub fn render_content<'a>(
    prefix: &str,
    sentence_ids: impl IntoIterator<Item = &'a SentenceId>,
    remaining: Option<&str>,
) -> String {
    let mut out = String::from(prefix);
    for id in sentence_ids {
        out.push_str(&marker(*id));
    }
    if let Some(rest) = remaining {
        out.push_str(rest);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn render_then_strip_leaves_prefix_and_remainder() {
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        let content = render_content("Chapter 1. ", &ids, Some(" The end."));
        assert!(has_markers(&content));
        assert_eq!(content.matches("[[").count(), 2);
        assert_eq!(strip_markers(&content), "Chapter 1.  The end.");
    }

    #[test]
    fn single_brackets_are_not_markers() {
        assert!(!has_markers("He said [sic] and left"));
        assert!(!has_markers("empty [[]] brackets"));
        assert_eq!(strip_markers("a [b] c"), "a [b] c");
    }
}
