//! Persistence adapter contracts.
//!
//! The engine performs all I/O through these traits. Every call is a suspension point of an
//! alignment run; implementations report failures as [`StoreError`] and validate rows into the
//! typed records of [`crate::model`] before returning them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::model::{
    Block, BlockConversionStatus, BlockId, BlockSentenceLink, ConversionMetadata, Sentence,
    SentenceConversionStatus, SentenceId, SpeechId, Word, WordId,
};

/// Exclusive right to rewrite one block's content.
///
/// Two runs on the same block would both read, strip, and rewrite `content`; the lease
/// serializes them. It is acquired before the block is read and released after the last link
/// is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLease {
    pub block_id: BlockId,
    pub token: Uuid,
    pub acquired_at: DateTime<Utc>,
}

/// Fields written to a block once its sentences are matched.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockAlignmentUpdate {
    pub content: String,
    pub original_content: String,
    pub speech_id: SpeechId,
    pub begin_time: i64,
    pub end_time: i64,
    pub conversion_status: BlockConversionStatus,
    pub block_type: String,
    pub metadata: ConversionMetadata,
}

/// Fields written to each aligned sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceAlignmentUpdate {
    pub text_content: String,
    pub original_text_content: String,
    pub conversion_status: SentenceConversionStatus,
}

/// Fields written to a re-aligned word.
#[derive(Debug, Clone, PartialEq)]
pub struct WordUpdate {
    pub word: String,
    pub original_word: String,
}

#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Fails with [`StoreError::LeaseHeld`](crate::StoreError::LeaseHeld) while another run
    /// holds the block.
    async fn acquire_lease(&self, block_id: BlockId) -> StoreResult<BlockLease>;

    async fn release_lease(&self, lease: &BlockLease) -> StoreResult<()>;

    async fn get(&self, block_id: BlockId) -> StoreResult<Block>;

    /// Fails with [`StoreError::LeaseLost`](crate::StoreError::LeaseLost) unless `lease` is the
    /// block's current lease.
    async fn update(&self, lease: &BlockLease, update: BlockAlignmentUpdate) -> StoreResult<()>;
}

#[async_trait]
pub trait SentenceStore: Send + Sync {
    async fn get(&self, sentence_id: SentenceId) -> StoreResult<Sentence>;

    /// Sentences of `speech_id` with `begin_time >= min_begin_time`, ascending by `begin_time`.
    async fn list_from(&self, speech_id: SpeechId, min_begin_time: i64)
    -> StoreResult<Vec<Sentence>>;

    async fn update(
        &self,
        sentence_id: SentenceId,
        update: SentenceAlignmentUpdate,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait WordStore: Send + Sync {
    /// Words of a sentence, ascending by `begin_time`.
    async fn list_by_sentence(&self, sentence_id: SentenceId) -> StoreResult<Vec<Word>>;

    async fn update(&self, word_id: WordId, update: WordUpdate) -> StoreResult<()>;

    /// Returns the number of deleted records.
    async fn delete(&self, word_ids: &[WordId]) -> StoreResult<usize>;
}

#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn insert(&self, link: BlockSentenceLink) -> StoreResult<()>;

    /// Remove every link of a block. Returns the number of removed links.
    async fn delete_by_block(&self, block_id: BlockId) -> StoreResult<usize>;
}

/// The adapters an [`Aligner`](crate::Aligner) works against.
#[derive(Clone)]
pub struct Stores {
    pub blocks: Arc<dyn BlockStore>,
    pub sentences: Arc<dyn SentenceStore>,
    pub words: Arc<dyn WordStore>,
    pub links: Arc<dyn LinkStore>,
}

impl Stores {
    /// Use one backend for every record type.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: BlockStore + SentenceStore + WordStore + LinkStore + 'static,
    {
        Self {
            blocks: store.clone(),
            sentences: store.clone(),
            words: store.clone(),
            links: store,
        }
    }
}
