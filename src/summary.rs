//! Human-oriented summary of a persisted alignment run, emitted as tracing events.

use tracing::info;

use crate::aligner::AlignmentResult;
use crate::model::BlockSentenceLink;

/// Longest text preview logged, in characters.
pub const PREVIEW_CHARS: usize = 200;

/// First [`PREVIEW_CHARS`] characters of `text`, with `...` appended when cut.
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Log the block, every aligned sentence with its word changes, and the leftover text.
pub(crate) fn log_alignment(
    result: &AlignmentResult,
    block_text: &str,
    links: &[BlockSentenceLink],
) {
    info!(
        target: "blockalign::summary",
        block_id = %result.block_id,
        speech_id = %result.speech_id,
        sentences = result.aligned_sentences.len(),
        block_preview = %preview(block_text),
        "alignment summary"
    );

    for sentence in &result.aligned_sentences {
        let link = links.iter().find(|l| l.sentence_id == sentence.sentence_id);
        info!(
            target: "blockalign::summary",
            order = sentence.order_index,
            sentence_id = %sentence.sentence_id,
            begin_time = sentence.begin_time,
            end_time = sentence.end_time,
            original = %sentence.original_text,
            aligned = %sentence.aligned_text,
            words = link.map_or(0, |l| l.alignment_metadata.word_changes.word_count),
            "aligned sentence"
        );

        let Some(link) = link else { continue };
        for change in &link.alignment_metadata.word_changes.words {
            info!(
                target: "blockalign::summary",
                sentence_id = %sentence.sentence_id,
                index = change.index,
                original = change.original.as_deref().unwrap_or("(none)"),
                aligned = %change.aligned,
                time_range = %change.time_range,
                "word change"
            );
        }
    }

    match &result.remaining_text {
        Some(rest) => info!(
            target: "blockalign::summary",
            chars = rest.chars().count(),
            preview = %preview(rest),
            "unaligned text remains"
        ),
        None => info!(target: "blockalign::summary", "block fully aligned"),
    }
}
