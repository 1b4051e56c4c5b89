//! Word-level re-alignment of one sentence after its text was replaced.
//!
//! ASR word records carry timings but spell the recognizer's tokens. Once a sentence's
//! `text_content` becomes the block's written text, each surviving record is rewritten to the
//! matching written token and the records with no counterpart are deleted.

use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{debug, trace};

use crate::error::StoreResult;
use crate::model::{SentenceId, Word, WordId};
use crate::similarity::{DiceBigram, SimilarityMetric};
use crate::store::{SentenceStore, WordStore, WordUpdate};
use crate::tokenize;

/// Minimum token similarity for a cursor pair, and the bar an existing record must clear.
pub const WORD_MATCH_THRESHOLD: f64 = 0.6;

/// What a word alignment pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WordAlignmentReport {
    pub updated: usize,
    pub deleted: usize,
}

pub struct WordAligner<M: SimilarityMetric = DiceBigram> {
    metric: M,
    sentences: Arc<dyn SentenceStore>,
    words: Arc<dyn WordStore>,
    batch_size: usize,
}

impl<M: SimilarityMetric> WordAligner<M> {
    pub fn new(
        metric: M,
        sentences: Arc<dyn SentenceStore>,
        words: Arc<dyn WordStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            metric,
            sentences,
            words,
            batch_size: batch_size.max(1),
        }
    }

    /// Rewrite the word records of `sentence_id` to the tokens of `aligned_text`.
    ///
    /// The sentence's frozen ASR text must already be committed: it is what the existing
    /// records are matched against.
    pub async fn align_words_for_sentence(
        &self,
        sentence_id: SentenceId,
        aligned_text: &str,
    ) -> StoreResult<WordAlignmentReport> {
        let existing = self.words.list_by_sentence(sentence_id).await?;
        let sentence = self.sentences.get(sentence_id).await?;

        if existing.is_empty() {
            debug!(%sentence_id, "no word records to align");
            return Ok(WordAlignmentReport::default());
        }

        let original = tokenize::words(sentence.source_text());
        let aligned = tokenize::words(aligned_text);
        let planned = self.plan(&original, &aligned, &existing);

        for batch in planned.chunks(self.batch_size) {
            try_join_all(
                batch
                    .iter()
                    .map(|(word_id, update)| self.words.update(*word_id, update.clone())),
            )
            .await?;
        }

        let stale: Vec<WordId> = existing
            .iter()
            .map(|w| w.id)
            .filter(|id| !planned.iter().any(|(updated, _)| updated == id))
            .collect();
        let deleted = if stale.is_empty() {
            0
        } else {
            self.words.delete(&stale).await?
        };

        debug!(
            %sentence_id,
            updated = planned.len(),
            deleted,
            "word alignment complete"
        );
        Ok(WordAlignmentReport {
            updated: planned.len(),
            deleted,
        })
    }

    /// Walk both token lists and pick the record each aligned token is written to.
    ///
    /// Every record is targeted at most once.
    fn plan(
        &self,
        original: &[&str],
        aligned: &[&str],
        existing: &[Word],
    ) -> Vec<(WordId, WordUpdate)> {
        let mut taken = vec![false; existing.len()];
        let mut planned = Vec::new();
        let (mut oi, mut ai) = (0, 0);

        while oi < original.len() && ai < aligned.len() {
            let original_token = original[oi];
            let aligned_token = aligned[ai];
            let key = original_token.to_lowercase();

            let pair = self.metric.compare(&key, &aligned_token.to_lowercase());
            let best = self.best_existing(&key, existing, &taken);

            if pair < WORD_MATCH_THRESHOLD && best.is_none() {
                trace!(token = original_token, "skipping unaligned token");
                oi += 1;
                continue;
            }

            // Without a close record the next untouched one inherits the token.
            match best.or_else(|| taken.iter().position(|t| !t)) {
                Some(idx) => {
                    taken[idx] = true;
                    planned.push((
                        existing[idx].id,
                        WordUpdate {
                            word: aligned_token.to_string(),
                            original_word: original_token.to_string(),
                        },
                    ));
                }
                None => trace!(token = aligned_token, "every record already rewritten"),
            }
            oi += 1;
            ai += 1;
        }
        planned
    }

    /// Index of the untouched record most similar to `key`, if any clears the threshold.
    fn best_existing(&self, key: &str, existing: &[Word], taken: &[bool]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, word) in existing.iter().enumerate() {
            if taken[idx] {
                continue;
            }
            let score = self.metric.compare(key, &word.word.to_lowercase());
            if score > WORD_MATCH_THRESHOLD && best.is_none_or(|(_, top)| score > top) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::model::{Sentence, SentenceConversionStatus};
    use uuid::Uuid;

    fn seed(
        store: &MemoryStore,
        asr: &str,
        records: &[&str],
    ) -> anyhow::Result<(SentenceId, Vec<WordId>)> {
        let sentence = Sentence {
            id: Uuid::new_v4(),
            speech_id: Uuid::new_v4(),
            text_content: asr.into(),
            original_text_content: Some(asr.into()),
            begin_time: 0,
            end_time: 5_000,
            conversion_status: SentenceConversionStatus::Unconverted,
        };
        let sentence_id = sentence.id;
        store.insert_sentence(sentence)?;

        let mut ids = Vec::new();
        for (i, text) in records.iter().enumerate() {
            let id = Uuid::new_v4();
            let begin = i as i64 * 400;
            store.insert_word(Word {
                id,
                sentence_id,
                word: (*text).into(),
                original_word: None,
                begin_time: begin,
                end_time: begin + 350,
            })?;
            ids.push(id);
        }
        Ok((sentence_id, ids))
    }

    fn aligner(store: &Arc<MemoryStore>, batch_size: usize) -> WordAligner {
        WordAligner::new(DiceBigram, store.clone(), store.clone(), batch_size)
    }

    #[tokio::test]
    async fn identical_tokens_update_in_place() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (sentence_id, ids) = seed(&store, "Hello there", &["Hello", "there"])?;

        let report = aligner(&store, 50)
            .align_words_for_sentence(sentence_id, "Hello there.")
            .await?;
        assert_eq!(report, WordAlignmentReport { updated: 2, deleted: 0 });

        let words = store.words_for(sentence_id);
        assert_eq!(words.iter().map(|w| w.id).collect::<Vec<_>>(), ids);
        assert_eq!(words[0].word, "Hello");
        assert_eq!(words[0].original_word.as_deref(), Some("Hello"));
        assert_eq!(words[1].word, "there");
        Ok(())
    }

    #[tokio::test]
    async fn surplus_records_are_deleted() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (sentence_id, ids) = seed(&store, "hello there friend", &["hello", "there", "friend"])?;

        let report = aligner(&store, 1)
            .align_words_for_sentence(sentence_id, "Hello there.")
            .await?;
        assert_eq!(report, WordAlignmentReport { updated: 2, deleted: 1 });

        let words = store.words_for(sentence_id);
        assert_eq!(words.iter().map(|w| w.id).collect::<Vec<_>>(), ids[..2]);
        assert_eq!(words[0].word, "Hello");
        assert_eq!(words[0].original_word.as_deref(), Some("hello"));
        Ok(())
    }

    #[tokio::test]
    async fn unmatched_asr_tokens_are_skipped() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (sentence_id, _) = seed(&store, "uh hello there", &["hello", "there"])?;

        let report = aligner(&store, 50)
            .align_words_for_sentence(sentence_id, "Hello there.")
            .await?;
        assert_eq!(report, WordAlignmentReport { updated: 2, deleted: 0 });

        let words = store.words_for(sentence_id);
        assert_eq!(words[0].original_word.as_deref(), Some("hello"));
        assert_eq!(words[1].original_word.as_deref(), Some("there"));
        Ok(())
    }

    #[tokio::test]
    async fn close_pair_without_close_record_uses_next_untouched_record() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (sentence_id, ids) = seed(&store, "colour", &["kolor"])?;

        let report = aligner(&store, 50)
            .align_words_for_sentence(sentence_id, "color")
            .await?;
        assert_eq!(report.updated, 1);

        let words = store.words_for(sentence_id);
        assert_eq!(words[0].id, ids[0]);
        assert_eq!(words[0].word, "color");
        assert_eq!(words[0].original_word.as_deref(), Some("colour"));
        Ok(())
    }

    #[tokio::test]
    async fn sentence_without_records_is_a_no_op() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (sentence_id, _) = seed(&store, "Hello there", &[])?;

        let report = aligner(&store, 50)
            .align_words_for_sentence(sentence_id, "Hello there.")
            .await?;
        assert_eq!(report, WordAlignmentReport::default());
        Ok(())
    }
}
