//! Typed records exchanged with the persistence adapters.
//!
//! Adapters are expected to validate rows into these types at their boundary; a record that
//! cannot be represented here surfaces as [`StoreError::InvalidRecord`] instead of being
//! silently defaulted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

pub type BlockId = Uuid;
pub type SentenceId = Uuid;
pub type SpeechId = Uuid;
pub type WordId = Uuid;

/// Conversion state of a text block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockConversionStatus {
    #[default]
    Unconverted,
    PartiallyConverted,
    Completed,
}

/// Conversion state of a transcript sentence. `Converted` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceConversionStatus {
    #[default]
    Unconverted,
    Converted,
}

/// `block_type` recorded on a block once audio has been aligned onto it.
pub const AUDIO_ALIGNED_BLOCK_TYPE: &str = "audio_aligned";

/// A unit of written text (e.g. a paragraph) that audio can be aligned onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Current text, possibly carrying alignment markers.
    pub content: String,
    /// Pristine text captured before the first alignment.
    #[serde(default)]
    pub original_content: Option<String>,
    pub conversion_status: BlockConversionStatus,
    /// Provenance tag, e.g. [`AUDIO_ALIGNED_BLOCK_TYPE`].
    #[serde(default)]
    pub block_type: Option<String>,
    #[serde(default)]
    pub speech_id: Option<SpeechId>,
    #[serde(default)]
    pub begin_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub metadata: Option<ConversionMetadata>,
}

impl Block {
    pub fn new(id: BlockId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            original_content: None,
            conversion_status: BlockConversionStatus::Unconverted,
            block_type: None,
            speech_id: None,
            begin_time: None,
            end_time: None,
            metadata: None,
        }
    }

    /// The marker-free text an alignment run works on.
    ///
    /// A block that already carries markers had its aligned spans replaced by them, so the
    /// pristine `original_content` is the only faithful source; stripping markers from
    /// `content` is the fallback when it was never recorded.
    pub fn clean_text(&self) -> String {
        if !crate::markers::has_markers(&self.content) {
            return self.content.clone();
        }
        match &self.original_content {
            Some(original) => original.clone(),
            None => crate::markers::strip_markers(&self.content),
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        validate_times("block", self.id, self.begin_time, self.end_time)
    }
}

/// One time-stamped transcript segment produced by upstream speech recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub id: SentenceId,
    pub speech_id: SpeechId,
    /// Current text; becomes the aligned text after a successful run.
    pub text_content: String,
    /// Frozen ASR output, written on the first successful alignment.
    #[serde(default)]
    pub original_text_content: Option<String>,
    pub begin_time: i64,
    pub end_time: i64,
    pub conversion_status: SentenceConversionStatus,
}

impl Sentence {
    /// The ASR text that alignment compares against the block.
    pub fn source_text(&self) -> &str {
        self.original_text_content
            .as_deref()
            .unwrap_or(&self.text_content)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        validate_times(
            "sentence",
            self.id,
            Some(self.begin_time),
            Some(self.end_time),
        )
    }
}

/// One time-stamped token within a [`Sentence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub id: WordId,
    pub sentence_id: SentenceId,
    pub word: String,
    #[serde(default)]
    pub original_word: Option<String>,
    pub begin_time: i64,
    pub end_time: i64,
}

impl Word {
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_times("word", self.id, Some(self.begin_time), Some(self.end_time))
    }
}

fn validate_times(
    entity: &'static str,
    id: Uuid,
    begin: Option<i64>,
    end: Option<i64>,
) -> Result<(), StoreError> {
    match (begin, end) {
        (Some(b), _) if b < 0 => Err(StoreError::invalid(entity, id, "negative begin_time")),
        (Some(b), Some(e)) if e < b => Err(StoreError::invalid(
            entity,
            id,
            format!("end_time {e} precedes begin_time {b}"),
        )),
        _ => Ok(()),
    }
}

/// Link between a block and one sentence aligned onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSentenceLink {
    pub block_id: BlockId,
    pub sentence_id: SentenceId,
    /// 0-based position within the block's aligned run.
    pub order_index: u32,
    pub alignment_score: f64,
    /// Character offset into the block's `original_content`.
    pub segment_begin_offset: usize,
    pub segment_end_offset: usize,
    pub alignment_metadata: AlignmentMetadata,
}

impl BlockSentenceLink {
    pub fn validate(&self) -> Result<(), StoreError> {
        let id = format!("{}/{}", self.block_id, self.sentence_id);
        if self.segment_begin_offset >= self.segment_end_offset {
            return Err(StoreError::invalid(
                "block_sentence",
                id,
                format!(
                    "empty segment {}..{}",
                    self.segment_begin_offset, self.segment_end_offset
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.alignment_score) {
            return Err(StoreError::invalid(
                "block_sentence",
                id,
                format!("alignment score {} outside [0, 1]", self.alignment_score),
            ));
        }
        Ok(())
    }
}

/// Provenance recorded on a block after it was aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionMetadata {
    pub alignment_date: DateTime<Utc>,
    pub alignment_method: String,
    pub algorithm_version: String,
    pub aligned_sentences_count: usize,
    pub total_original_text_length: usize,
    pub aligned_text_length: usize,
    pub prefix_text_length: usize,
    pub remaining_text_length: usize,
}

/// Snapshot stored on each [`BlockSentenceLink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMetadata {
    pub alignment_summary: AlignmentSummary,
    pub word_changes: WordChanges,
    pub alignment_method: String,
    pub algorithm_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSummary {
    pub original_text: String,
    pub aligned_text: String,
    /// `"<begin>~<end>"` in milliseconds.
    pub time_range: String,
    pub character_count: usize,
    /// Similarity between the normalized ASR text and the final aligned text.
    pub text_similarity: f64,
    pub alignment_date: DateTime<Utc>,
}

/// Word records of a sentence as they stand after word-level re-alignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WordChanges {
    pub word_count: usize,
    pub words: Vec<WordChange>,
}

impl WordChanges {
    pub fn from_words(words: &[Word]) -> Self {
        let words: Vec<WordChange> = words
            .iter()
            .enumerate()
            .map(|(index, w)| WordChange {
                index,
                original: w.original_word.clone(),
                aligned: w.word.clone(),
                time_range: time_range(w.begin_time, w.end_time),
            })
            .collect();
        Self {
            word_count: words.len(),
            words,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordChange {
    pub index: usize,
    pub original: Option<String>,
    pub aligned: String,
    pub time_range: String,
}

pub(crate) fn time_range(begin: i64, end: i64) -> String {
    format!("{begin}~{end}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(original: Option<&str>) -> Sentence {
        Sentence {
            id: Uuid::new_v4(),
            speech_id: Uuid::new_v4(),
            text_content: "aligned text".into(),
            original_text_content: original.map(str::to_string),
            begin_time: 0,
            end_time: 1000,
            conversion_status: SentenceConversionStatus::Unconverted,
        }
    }

    #[test]
    fn source_text_prefers_frozen_asr_output() {
        assert_eq!(sentence(Some("asr text")).source_text(), "asr text");
        assert_eq!(sentence(None).source_text(), "aligned text");
    }

    #[test]
    fn clean_text_restores_original_content_when_markers_present() {
        let id = Uuid::new_v4();
        let mut block = Block::new(Uuid::new_v4(), format!("Intro. [[{id}]] tail"));
        assert_eq!(block.clean_text(), "Intro.  tail");

        block.original_content = Some("Intro. Hello there. tail".into());
        assert_eq!(block.clean_text(), "Intro. Hello there. tail");
    }

    #[test]
    fn clean_text_ignores_original_content_without_markers() {
        let mut block = Block::new(Uuid::new_v4(), "edited text");
        block.original_content = Some("older text".into());
        assert_eq!(block.clean_text(), "edited text");
    }

    #[test]
    fn conversion_status_is_required_when_loading() {
        let row = serde_json::json!({
            "id": Uuid::new_v4(),
            "speech_id": Uuid::new_v4(),
            "text_content": "Hello there.",
            "begin_time": 0,
            "end_time": 900,
        });
        assert!(serde_json::from_value::<Sentence>(row.clone()).is_err());

        let mut row = row;
        row["conversion_status"] = "converted".into();
        let sentence: Sentence = serde_json::from_value(row).expect("complete row");
        assert_eq!(sentence.conversion_status, SentenceConversionStatus::Converted);

        let block = serde_json::json!({ "id": Uuid::new_v4(), "content": "Text." });
        assert!(serde_json::from_value::<Block>(block).is_err());
    }

    #[test]
    fn validate_rejects_inverted_times() {
        let mut s = sentence(None);
        s.begin_time = 500;
        s.end_time = 100;
        let err = s.validate().unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { entity: "sentence", .. }));
    }

    #[test]
    fn word_changes_snapshot_keeps_order_and_times() {
        let sentence_id = Uuid::new_v4();
        let words = vec![
            Word {
                id: Uuid::new_v4(),
                sentence_id,
                word: "Hello".into(),
                original_word: Some("hello".into()),
                begin_time: 0,
                end_time: 300,
            },
            Word {
                id: Uuid::new_v4(),
                sentence_id,
                word: "there".into(),
                original_word: None,
                begin_time: 300,
                end_time: 650,
            },
        ];
        let changes = WordChanges::from_words(&words);
        assert_eq!(changes.word_count, 2);
        assert_eq!(changes.words[0].original.as_deref(), Some("hello"));
        assert_eq!(changes.words[1].time_range, "300~650");
    }
}
