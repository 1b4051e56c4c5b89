//! Persistence stages of an alignment run.
//!
//! A run writes in a fixed order: block and sentence text, then word records, then links.
//! Each stage consumes the previous one, so a later write cannot be issued before the writes
//! it depends on have completed.

use chrono::Utc;
use tracing::info;

use crate::aligner::{AlignedSentence, AlignmentResult};
use crate::error::{Error, Result, Stage};
use crate::markers;
use crate::model::{
    AUDIO_ALIGNED_BLOCK_TYPE, AlignmentMetadata, AlignmentSummary, BlockConversionStatus, BlockId,
    BlockSentenceLink, ConversionMetadata, Sentence, SentenceConversionStatus, SpeechId,
    WordChanges, time_range,
};
use crate::normalize::normalize;
use crate::opts::Opts;
use crate::similarity::SimilarityMetric;
use crate::store::{BlockAlignmentUpdate, BlockLease, SentenceAlignmentUpdate, Stores};
use crate::word_aligner::{WordAligner, WordAlignmentReport};

/// One accepted match, with offsets into the block's clean text.
#[derive(Debug, Clone)]
pub(crate) struct PlannedSentence {
    pub sentence: Sentence,
    pub aligned_text: String,
    pub order_index: u32,
    pub score: f64,
    pub begin_offset: usize,
    pub end_offset: usize,
}

/// Outcome of matching a candidate run against a block, before anything is written.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub block_id: BlockId,
    pub speech_id: SpeechId,
    pub clean_text: String,
    pub prefix: String,
    pub sentences: Vec<PlannedSentence>,
    pub remaining_text: Option<String>,
}

impl Plan {
    /// `cursor` is the character offset where unconsumed text starts.
    pub fn new(
        block_id: BlockId,
        speech_id: SpeechId,
        clean_text: String,
        sentences: Vec<PlannedSentence>,
        cursor: usize,
    ) -> Self {
        let prefix = match sentences.first() {
            Some(first) => clean_text.chars().take(first.begin_offset).collect(),
            None => String::new(),
        };
        let rest: String = clean_text.chars().skip(cursor).collect();
        let remaining_text = (!rest.trim().is_empty()).then_some(rest);

        Self {
            block_id,
            speech_id,
            clean_text,
            prefix,
            sentences,
            remaining_text,
        }
    }

    pub fn conversion_status(&self) -> BlockConversionStatus {
        if self.sentences.is_empty() {
            BlockConversionStatus::Unconverted
        } else if self.prefix.trim().is_empty() && self.remaining_text.is_none() {
            BlockConversionStatus::Completed
        } else {
            BlockConversionStatus::PartiallyConverted
        }
    }

    pub fn into_result(self) -> AlignmentResult {
        let conversion_status = Some(self.conversion_status());
        AlignmentResult {
            block_id: self.block_id,
            speech_id: self.speech_id,
            aligned_sentences: self
                .sentences
                .into_iter()
                .map(|p| AlignedSentence {
                    sentence_id: p.sentence.id,
                    original_text: p.sentence.source_text().to_string(),
                    aligned_text: p.aligned_text,
                    begin_time: p.sentence.begin_time,
                    end_time: p.sentence.end_time,
                    order_index: p.order_index,
                    score: p.score,
                    segment_begin_offset: p.begin_offset,
                    segment_end_offset: p.end_offset,
                })
                .collect(),
            remaining_text: self.remaining_text,
            success: true,
            message: None,
            conversion_status,
        }
    }

    fn conversion_metadata(&self, opts: &Opts) -> ConversionMetadata {
        ConversionMetadata {
            alignment_date: Utc::now(),
            alignment_method: opts.alignment_method.clone(),
            algorithm_version: opts.algorithm_version.clone(),
            aligned_sentences_count: self.sentences.len(),
            total_original_text_length: self.clean_text.chars().count(),
            aligned_text_length: self
                .sentences
                .iter()
                .map(|p| p.aligned_text.chars().count())
                .sum(),
            prefix_text_length: self.prefix.chars().count(),
            remaining_text_length: self
                .remaining_text
                .as_deref()
                .map_or(0, |rest| rest.chars().count()),
        }
    }

    /// Write the block's marker content and every aligned sentence's text.
    ///
    /// Must only be called with at least one planned sentence.
    pub async fn commit_text(
        self,
        stores: &Stores,
        lease: &BlockLease,
        opts: &Opts,
    ) -> Result<TextCommitted> {
        let (Some(first), Some(last)) = (self.sentences.first(), self.sentences.last()) else {
            return Err(Error::msg("nothing to commit: no sentence was aligned"));
        };

        let update = BlockAlignmentUpdate {
            content: markers::render_content(
                &self.prefix,
                self.sentences.iter().map(|p| &p.sentence.id),
                self.remaining_text.as_deref(),
            ),
            original_content: self.clean_text.clone(),
            speech_id: self.speech_id,
            begin_time: first.sentence.begin_time,
            end_time: last.sentence.end_time,
            conversion_status: self.conversion_status(),
            block_type: AUDIO_ALIGNED_BLOCK_TYPE.to_string(),
            metadata: self.conversion_metadata(opts),
        };
        stores
            .blocks
            .update(lease, update)
            .await
            .map_err(|e| Error::store(Stage::CommitText, self.block_id, e))?;

        for planned in &self.sentences {
            let update = SentenceAlignmentUpdate {
                text_content: planned.aligned_text.clone(),
                original_text_content: planned.sentence.source_text().to_string(),
                conversion_status: SentenceConversionStatus::Converted,
            };
            stores
                .sentences
                .update(planned.sentence.id, update)
                .await
                .map_err(|e| Error::store(Stage::CommitText, self.block_id, e))?;
        }

        info!(
            block_id = %self.block_id,
            sentences = self.sentences.len(),
            "block and sentence text committed"
        );
        Ok(TextCommitted { plan: self })
    }
}

/// Block and sentence text are persisted.
pub(crate) struct TextCommitted {
    plan: Plan,
}

impl TextCommitted {
    /// Re-align the word records of every aligned sentence, in order.
    pub async fn align_words<M: SimilarityMetric>(
        self,
        aligner: &WordAligner<M>,
    ) -> Result<WordsAligned> {
        let mut reports = Vec::with_capacity(self.plan.sentences.len());
        for planned in &self.plan.sentences {
            let report = aligner
                .align_words_for_sentence(planned.sentence.id, &planned.aligned_text)
                .await
                .map_err(|e| Error::store(Stage::AlignWords, self.plan.block_id, e))?;
            reports.push(report);
        }

        info!(
            block_id = %self.plan.block_id,
            updated = reports.iter().map(|r| r.updated).sum::<usize>(),
            deleted = reports.iter().map(|r| r.deleted).sum::<usize>(),
            "word records aligned"
        );
        Ok(WordsAligned {
            plan: self.plan,
            reports,
        })
    }
}

/// Word records reflect the aligned text.
pub(crate) struct WordsAligned {
    plan: Plan,
    reports: Vec<WordAlignmentReport>,
}

impl WordsAligned {
    /// Replace the block's links with one per aligned sentence.
    ///
    /// Each link snapshots the sentence's word records as they stand now.
    pub async fn insert_links<M: SimilarityMetric>(
        self,
        stores: &Stores,
        metric: &M,
        opts: &Opts,
    ) -> Result<Linked> {
        let block_id = self.plan.block_id;
        let stage_err = |e| Error::store(Stage::InsertLinks, block_id, e);

        let cleared = stores.links.delete_by_block(block_id).await.map_err(stage_err)?;
        if cleared > 0 {
            info!(%block_id, cleared, "cleared links of a previous run");
        }

        let mut links = Vec::with_capacity(self.plan.sentences.len());
        for planned in &self.plan.sentences {
            let words = stores
                .words
                .list_by_sentence(planned.sentence.id)
                .await
                .map_err(stage_err)?;
            let original_text = planned.sentence.source_text().to_string();
            let text_similarity =
                metric.compare(&normalize(&original_text), &normalize(&planned.aligned_text));

            let link = BlockSentenceLink {
                block_id,
                sentence_id: planned.sentence.id,
                order_index: planned.order_index,
                alignment_score: planned.score,
                segment_begin_offset: planned.begin_offset,
                segment_end_offset: planned.end_offset,
                alignment_metadata: AlignmentMetadata {
                    alignment_summary: AlignmentSummary {
                        original_text,
                        aligned_text: planned.aligned_text.clone(),
                        time_range: time_range(
                            planned.sentence.begin_time,
                            planned.sentence.end_time,
                        ),
                        character_count: planned.aligned_text.chars().count(),
                        text_similarity,
                        alignment_date: Utc::now(),
                    },
                    word_changes: WordChanges::from_words(&words),
                    alignment_method: opts.alignment_method.clone(),
                    algorithm_version: opts.algorithm_version.clone(),
                },
            };
            stores.links.insert(link.clone()).await.map_err(stage_err)?;
            links.push(link);
        }

        info!(%block_id, links = links.len(), "block-sentence links inserted");
        Ok(Linked {
            plan: self.plan,
            reports: self.reports,
            links,
        })
    }
}

/// Every write of the run has completed.
pub(crate) struct Linked {
    plan: Plan,
    reports: Vec<WordAlignmentReport>,
    links: Vec<BlockSentenceLink>,
}

impl Linked {
    pub fn clean_text(&self) -> &str {
        &self.plan.clean_text
    }

    pub fn links(&self) -> &[BlockSentenceLink] {
        &self.links
    }

    pub fn word_reports(&self) -> &[WordAlignmentReport] {
        &self.reports
    }

    pub fn into_result(self) -> AlignmentResult {
        self.plan.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn planned(text: &str, begin: usize, end: usize) -> PlannedSentence {
        PlannedSentence {
            sentence: Sentence {
                id: Uuid::new_v4(),
                speech_id: Uuid::nil(),
                text_content: text.to_lowercase(),
                original_text_content: None,
                begin_time: 0,
                end_time: 1_000,
                conversion_status: SentenceConversionStatus::Unconverted,
            },
            aligned_text: text.into(),
            order_index: 0,
            score: 1.0,
            begin_offset: begin,
            end_offset: end,
        }
    }

    #[test]
    fn whole_block_aligned_is_completed() {
        let text = "Hello there.";
        let plan = Plan::new(
            Uuid::nil(),
            Uuid::nil(),
            text.into(),
            vec![planned(text, 0, 12)],
            12,
        );
        assert_eq!(plan.prefix, "");
        assert_eq!(plan.remaining_text, None);
        assert_eq!(plan.conversion_status(), BlockConversionStatus::Completed);
    }

    #[test]
    fn leading_prefix_or_leftover_is_partial() {
        let text = "Intro. Hello there. Outro.";
        let plan = Plan::new(
            Uuid::nil(),
            Uuid::nil(),
            text.into(),
            vec![planned("Hello there.", 7, 19)],
            19,
        );
        assert_eq!(plan.prefix, "Intro. ");
        assert_eq!(plan.remaining_text.as_deref(), Some(" Outro."));
        assert_eq!(plan.conversion_status(), BlockConversionStatus::PartiallyConverted);

        let metadata = plan.conversion_metadata(&Opts::default());
        assert_eq!(metadata.total_original_text_length, 26);
        assert_eq!(metadata.aligned_text_length, 12);
        assert_eq!(metadata.prefix_text_length, 7);
        assert_eq!(metadata.remaining_text_length, 7);
        assert_eq!(metadata.alignment_method, "string_similarity");
    }

    #[test]
    fn whitespace_only_prefix_still_completes() {
        let text = "  Hello there.  ";
        let plan = Plan::new(
            Uuid::nil(),
            Uuid::nil(),
            text.into(),
            vec![planned("Hello there.", 2, 14)],
            14,
        );
        assert_eq!(plan.remaining_text, None);
        assert_eq!(plan.conversion_status(), BlockConversionStatus::Completed);
    }

    #[test]
    fn nothing_aligned_keeps_all_text_remaining() {
        let plan = Plan::new(Uuid::nil(), Uuid::nil(), "Some text.".into(), Vec::new(), 0);
        let result = plan.into_result();
        assert!(result.success);
        assert!(result.aligned_sentences.is_empty());
        assert_eq!(result.remaining_text.as_deref(), Some("Some text."));
        assert_eq!(result.conversion_status, Some(BlockConversionStatus::Unconverted));
    }
}
