//! Block-level alignment: match a run of transcript sentences onto one block and persist it.

use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{Error, Result, Stage};
use crate::matcher::SentenceMatcher;
use crate::model::{BlockConversionStatus, BlockId, Sentence, SentenceId, SpeechId};
use crate::opts::Opts;
use crate::pipeline::{Plan, PlannedSentence};
use crate::similarity::{DiceBigram, SimilarityMetric};
use crate::store::{BlockLease, Stores};
use crate::summary;
use crate::word_aligner::WordAligner;

/// One sentence of the run that was matched onto the block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedSentence {
    pub sentence_id: SentenceId,
    /// ASR text the match was computed from.
    pub original_text: String,
    /// Span of the block text the sentence was matched to.
    pub aligned_text: String,
    pub begin_time: i64,
    pub end_time: i64,
    pub order_index: u32,
    pub score: f64,
    /// Character offsets into the block's clean text.
    pub segment_begin_offset: usize,
    pub segment_end_offset: usize,
}

/// Outcome of [`Aligner::align_sentence_to_block`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentResult {
    pub block_id: BlockId,
    pub speech_id: SpeechId,
    pub aligned_sentences: Vec<AlignedSentence>,
    /// Block text left unconsumed, or `None` when nothing but whitespace remains.
    pub remaining_text: Option<String>,
    pub success: bool,
    pub message: Option<String>,
    pub conversion_status: Option<BlockConversionStatus>,
}

impl AlignmentResult {
    pub fn failed(block_id: BlockId, speech_id: SpeechId, err: &Error) -> Self {
        Self {
            block_id,
            speech_id,
            aligned_sentences: Vec::new(),
            remaining_text: None,
            success: false,
            message: Some(err.to_string()),
            conversion_status: None,
        }
    }
}

/// Aligns transcript sentences onto book text blocks.
///
/// Matching is pure CPU work; every suspension point is a call into [`Stores`]. Runs on
/// different blocks may execute concurrently. Runs on the same block are serialized by a
/// block lease taken for the duration of the run.
pub struct Aligner<M: SimilarityMetric + Clone = DiceBigram> {
    stores: Stores,
    matcher: SentenceMatcher<M>,
    word_aligner: WordAligner<M>,
    opts: Opts,
}

impl Aligner<DiceBigram> {
    pub fn new(stores: Stores, opts: Opts) -> Self {
        Self::with_metric(stores, opts, DiceBigram)
    }
}

impl<M: SimilarityMetric + Clone> Aligner<M> {
    pub fn with_metric(stores: Stores, opts: Opts, metric: M) -> Self {
        let word_aligner = WordAligner::new(
            metric.clone(),
            stores.sentences.clone(),
            stores.words.clone(),
            opts.word_update_batch_size,
        );
        Self {
            matcher: SentenceMatcher::with_metric(metric),
            word_aligner,
            stores,
            opts,
        }
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Align the run of `speech_id` starting at `anchor_id` onto `block_id`.
    ///
    /// Never fails: errors are reported through `success` and `message`.
    pub async fn align_sentence_to_block(
        &self,
        block_id: BlockId,
        anchor_id: SentenceId,
        speech_id: SpeechId,
    ) -> AlignmentResult {
        match self
            .try_align_sentence_to_block(block_id, anchor_id, speech_id)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(%block_id, %speech_id, error = %err, "alignment failed");
                AlignmentResult::failed(block_id, speech_id, &err)
            }
        }
    }

    /// Like [`align_sentence_to_block`](Self::align_sentence_to_block), returning the error.
    ///
    /// A failed run leaves whatever it already wrote; re-running starts from the block's clean
    /// text again.
    pub async fn try_align_sentence_to_block(
        &self,
        block_id: BlockId,
        anchor_id: SentenceId,
        speech_id: SpeechId,
    ) -> Result<AlignmentResult> {
        let span = info_span!(
            "align_block",
            %block_id,
            %anchor_id,
            %speech_id,
            dry_run = self.opts.dry_run
        );

        async move {
            if self.opts.dry_run {
                let plan = self.plan_run(block_id, anchor_id, speech_id).await?;
                return Ok(plan.into_result());
            }

            let lease = self
                .stores
                .blocks
                .acquire_lease(block_id)
                .await
                .map_err(|e| Error::store(Stage::AcquireLease, block_id, e))?;

            let run_res = self.run(&lease, anchor_id, speech_id).await;
            let release_res = self
                .stores
                .blocks
                .release_lease(&lease)
                .await
                .map_err(|e| Error::store(Stage::ReleaseLease, block_id, e));
            merge_run_and_release(run_res, release_res)
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        lease: &BlockLease,
        anchor_id: SentenceId,
        speech_id: SpeechId,
    ) -> Result<AlignmentResult> {
        let plan = self.plan_run(lease.block_id, anchor_id, speech_id).await?;
        if plan.sentences.is_empty() {
            info!("no sentence aligned; block left unchanged");
            return Ok(plan.into_result());
        }

        let linked = plan
            .commit_text(&self.stores, lease, &self.opts)
            .await?
            .align_words(&self.word_aligner)
            .await?
            .insert_links(&self.stores, self.matcher.metric(), &self.opts)
            .await?;

        let clean_text = linked.clean_text().to_string();
        let links = linked.links().to_vec();
        let words_deleted: usize = linked.word_reports().iter().map(|r| r.deleted).sum();
        let result = linked.into_result();

        info!(
            aligned = result.aligned_sentences.len(),
            words_deleted,
            status = ?result.conversion_status,
            "alignment persisted"
        );
        if self.opts.log_summary {
            summary::log_alignment(&result, &clean_text, &links);
        }
        Ok(result)
    }

    /// Fetch the block and the candidate run, then match without writing anything.
    async fn plan_run(
        &self,
        block_id: BlockId,
        anchor_id: SentenceId,
        speech_id: SpeechId,
    ) -> Result<Plan> {
        let block = self
            .stores
            .blocks
            .get(block_id)
            .await
            .map_err(|e| Error::store(Stage::FetchBlock, block_id, e))?;
        let anchor = self
            .stores
            .sentences
            .get(anchor_id)
            .await
            .map_err(|e| Error::store(Stage::FetchAnchor, block_id, e))?;
        let run = self
            .stores
            .sentences
            .list_from(speech_id, anchor.begin_time)
            .await
            .map_err(|e| Error::store(Stage::FetchRun, block_id, e))?;

        if run.is_empty() {
            return Err(Error::EmptyCandidateRun {
                speech_id,
                min_begin_time: anchor.begin_time,
            });
        }
        debug!(candidates = run.len(), "candidate run fetched");

        Ok(self.plan(block_id, speech_id, block.clean_text(), run))
    }

    /// Cascade the run over the block text.
    ///
    /// Each accepted match consumes the text up to its end; the first rejected sentence, or
    /// running out of text, ends the cascade.
    fn plan(
        &self,
        block_id: BlockId,
        speech_id: SpeechId,
        clean_text: String,
        run: Vec<Sentence>,
    ) -> Plan {
        let chars: Vec<char> = clean_text.chars().collect();
        let mut cursor = 0;
        let mut planned: Vec<PlannedSentence> = Vec::new();

        for sentence in run {
            let rest = &chars[cursor..];
            if rest.iter().all(|c| c.is_whitespace()) {
                debug!("block text exhausted");
                break;
            }

            let outcome = self
                .matcher
                .find_best_match_chars(sentence.source_text(), rest);
            let Some(aligned_text) = outcome.accepted_text().map(str::to_string) else {
                debug!(
                    sentence_id = %sentence.id,
                    score = outcome.score,
                    "match rejected; ending cascade"
                );
                break;
            };

            let begin_offset = cursor + outcome.start;
            let end_offset = cursor + outcome.end;
            debug!(
                sentence_id = %sentence.id,
                score = outcome.score,
                begin_offset,
                end_offset,
                "sentence matched"
            );
            planned.push(PlannedSentence {
                order_index: planned.len() as u32,
                score: outcome.score,
                begin_offset,
                end_offset,
                aligned_text,
                sentence,
            });
            cursor = end_offset;
        }

        Plan::new(block_id, speech_id, clean_text, planned, cursor)
    }
}

/// Combine the run's outcome with releasing its lease; the run's own error wins.
fn merge_run_and_release<T>(run_res: Result<T>, release_res: Result<()>) -> Result<T> {
    match (run_res, release_res) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!(error = %release_err, "lease release failed after a failed run");
            Err(err)
        }
    }
}
