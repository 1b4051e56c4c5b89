//! In-memory implementation of every persistence adapter.
//!
//! `MemoryStore` backs the CLI and the test suite. It keeps records in insertion order so
//! ties in `begin_time` resolve deterministically, validates records on insert, and enforces
//! block leases with a configurable time-to-live.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::model::{
    Block, BlockId, BlockSentenceLink, Sentence, SentenceId, SpeechId, Word, WordId,
};
use crate::store::{
    BlockAlignmentUpdate, BlockLease, BlockStore, LinkStore, SentenceAlignmentUpdate,
    SentenceStore, WordStore, WordUpdate,
};

/// Default lifetime of a block lease before another run may take it over.
pub const DEFAULT_LEASE_TTL_SECONDS: i64 = 300;

/// Serializable contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
    #[serde(default)]
    pub words: Vec<Word>,
    #[serde(default)]
    pub links: Vec<BlockSentenceLink>,
}

impl Dataset {
    /// Load a dataset from a JSON file.
    ///
    /// Rows missing a required field are rejected as [`StoreError::InvalidRecord`].
    pub fn from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let dataset = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| StoreError::invalid("dataset", path.display(), err.to_string()))?;
        Ok(dataset)
    }
}

#[derive(Debug, Default)]
struct Tables {
    blocks: HashMap<BlockId, Block>,
    block_order: Vec<BlockId>,
    sentences: Vec<Sentence>,
    words: Vec<Word>,
    links: Vec<BlockSentenceLink>,
    leases: HashMap<BlockId, BlockLease>,
}

#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    lease_ttl: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lease_ttl(Duration::seconds(DEFAULT_LEASE_TTL_SECONDS))
    }

    pub fn with_lease_ttl(lease_ttl: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            lease_ttl,
        }
    }

    /// Build a store from a dataset, validating every record.
    pub fn from_dataset(dataset: Dataset) -> StoreResult<Self> {
        let store = Self::new();
        for block in dataset.blocks {
            store.insert_block(block)?;
        }
        for sentence in dataset.sentences {
            store.insert_sentence(sentence)?;
        }
        for word in dataset.words {
            store.insert_word(word)?;
        }
        for link in dataset.links {
            link.validate()?;
            store.tables.write().links.push(link);
        }
        Ok(store)
    }

    pub fn insert_block(&self, block: Block) -> StoreResult<()> {
        block.validate()?;
        let id = block.id;
        let mut tables = self.tables.write();
        if tables.blocks.insert(id, block).is_none() {
            tables.block_order.push(id);
        }
        Ok(())
    }

    pub fn insert_sentence(&self, sentence: Sentence) -> StoreResult<()> {
        sentence.validate()?;
        let mut tables = self.tables.write();
        match tables.sentences.iter().position(|s| s.id == sentence.id) {
            Some(idx) => tables.sentences[idx] = sentence,
            None => tables.sentences.push(sentence),
        }
        Ok(())
    }

    pub fn insert_word(&self, word: Word) -> StoreResult<()> {
        word.validate()?;
        let mut tables = self.tables.write();
        if !tables.sentences.iter().any(|s| s.id == word.sentence_id) {
            return Err(StoreError::invalid(
                "word",
                word.id,
                format!("unknown sentence {}", word.sentence_id),
            ));
        }
        match tables.words.iter().position(|w| w.id == word.id) {
            Some(idx) => tables.words[idx] = word,
            None => tables.words.push(word),
        }
        Ok(())
    }

    pub fn block(&self, block_id: BlockId) -> Option<Block> {
        self.tables.read().blocks.get(&block_id).cloned()
    }

    pub fn sentence(&self, sentence_id: SentenceId) -> Option<Sentence> {
        let tables = self.tables.read();
        tables.sentences.iter().find(|s| s.id == sentence_id).cloned()
    }

    /// Words of a sentence in `begin_time` order.
    pub fn words_for(&self, sentence_id: SentenceId) -> Vec<Word> {
        let tables = self.tables.read();
        sorted_words(&tables.words, sentence_id)
    }

    /// Links of a block in `order_index` order.
    pub fn links_for(&self, block_id: BlockId) -> Vec<BlockSentenceLink> {
        let tables = self.tables.read();
        let mut links: Vec<_> = tables
            .links
            .iter()
            .filter(|l| l.block_id == block_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.order_index);
        links
    }

    pub fn snapshot(&self) -> Dataset {
        let tables = self.tables.read();
        Dataset {
            blocks: tables
                .block_order
                .iter()
                .filter_map(|id| tables.blocks.get(id).cloned())
                .collect(),
            sentences: tables.sentences.clone(),
            words: tables.words.clone(),
            links: tables.links.clone(),
        }
    }

    fn lease_is_live(&self, lease: &BlockLease) -> bool {
        Utc::now() - lease.acquired_at < self.lease_ttl
    }
}

fn sorted_words(words: &[Word], sentence_id: SentenceId) -> Vec<Word> {
    let mut out: Vec<Word> = words
        .iter()
        .filter(|w| w.sentence_id == sentence_id)
        .cloned()
        .collect();
    // Stable: equal begin times keep insertion order.
    out.sort_by_key(|w| w.begin_time);
    out
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn acquire_lease(&self, block_id: BlockId) -> StoreResult<BlockLease> {
        let mut tables = self.tables.write();
        if let Some(current) = tables.leases.get(&block_id) {
            if self.lease_is_live(current) {
                return Err(StoreError::LeaseHeld { block_id });
            }
            debug!(%block_id, token = %current.token, "taking over expired lease");
        }
        let lease = BlockLease {
            block_id,
            token: Uuid::new_v4(),
            acquired_at: Utc::now(),
        };
        tables.leases.insert(block_id, lease.clone());
        Ok(lease)
    }

    async fn release_lease(&self, lease: &BlockLease) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let held = tables
            .leases
            .get(&lease.block_id)
            .is_some_and(|current| current.token == lease.token);
        if !held {
            return Err(StoreError::LeaseLost {
                block_id: lease.block_id,
            });
        }
        tables.leases.remove(&lease.block_id);
        Ok(())
    }

    async fn get(&self, block_id: BlockId) -> StoreResult<Block> {
        self.block(block_id)
            .ok_or_else(|| StoreError::not_found("block", block_id))
    }

    async fn update(&self, lease: &BlockLease, update: BlockAlignmentUpdate) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let held = tables
            .leases
            .get(&lease.block_id)
            .is_some_and(|current| current.token == lease.token && self.lease_is_live(current));
        if !held {
            return Err(StoreError::LeaseLost {
                block_id: lease.block_id,
            });
        }

        let block = tables
            .blocks
            .get_mut(&lease.block_id)
            .ok_or_else(|| StoreError::not_found("block", lease.block_id))?;
        block.content = update.content;
        block.original_content = Some(update.original_content);
        block.speech_id = Some(update.speech_id);
        block.begin_time = Some(update.begin_time);
        block.end_time = Some(update.end_time);
        block.conversion_status = update.conversion_status;
        block.block_type = Some(update.block_type);
        block.metadata = Some(update.metadata);
        Ok(())
    }
}

#[async_trait]
impl SentenceStore for MemoryStore {
    async fn get(&self, sentence_id: SentenceId) -> StoreResult<Sentence> {
        self.sentence(sentence_id)
            .ok_or_else(|| StoreError::not_found("sentence", sentence_id))
    }

    async fn list_from(
        &self,
        speech_id: SpeechId,
        min_begin_time: i64,
    ) -> StoreResult<Vec<Sentence>> {
        let tables = self.tables.read();
        let mut run: Vec<Sentence> = tables
            .sentences
            .iter()
            .filter(|s| s.speech_id == speech_id && s.begin_time >= min_begin_time)
            .cloned()
            .collect();
        run.sort_by_key(|s| s.begin_time);
        Ok(run)
    }

    async fn update(
        &self,
        sentence_id: SentenceId,
        update: SentenceAlignmentUpdate,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let sentence = tables
            .sentences
            .iter_mut()
            .find(|s| s.id == sentence_id)
            .ok_or_else(|| StoreError::not_found("sentence", sentence_id))?;
        sentence.text_content = update.text_content;
        sentence.original_text_content = Some(update.original_text_content);
        sentence.conversion_status = update.conversion_status;
        Ok(())
    }
}

#[async_trait]
impl WordStore for MemoryStore {
    async fn list_by_sentence(&self, sentence_id: SentenceId) -> StoreResult<Vec<Word>> {
        Ok(self.words_for(sentence_id))
    }

    async fn update(&self, word_id: WordId, update: WordUpdate) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let word = tables
            .words
            .iter_mut()
            .find(|w| w.id == word_id)
            .ok_or_else(|| StoreError::not_found("word", word_id))?;
        word.word = update.word;
        word.original_word = Some(update.original_word);
        Ok(())
    }

    async fn delete(&self, word_ids: &[WordId]) -> StoreResult<usize> {
        let mut tables = self.tables.write();
        let before = tables.words.len();
        tables.words.retain(|w| !word_ids.contains(&w.id));
        Ok(before - tables.words.len())
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn insert(&self, link: BlockSentenceLink) -> StoreResult<()> {
        link.validate()?;
        self.tables.write().links.push(link);
        Ok(())
    }

    async fn delete_by_block(&self, block_id: BlockId) -> StoreResult<usize> {
        let mut tables = self.tables.write();
        let before = tables.links.len();
        tables.links.retain(|l| l.block_id != block_id);
        Ok(before - tables.links.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sentence(speech_id: SpeechId, begin: i64, text: &str) -> Sentence {
        Sentence {
            id: Uuid::new_v4(),
            speech_id,
            text_content: text.into(),
            original_text_content: None,
            begin_time: begin,
            end_time: begin + 500,
            conversion_status: Default::default(),
        }
    }

    #[tokio::test]
    async fn list_from_filters_and_orders_by_begin_time() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let speech = Uuid::new_v4();
        store.insert_sentence(sentence(speech, 3000, "third"))?;
        store.insert_sentence(sentence(speech, 1000, "first"))?;
        store.insert_sentence(sentence(speech, 2000, "second"))?;
        store.insert_sentence(sentence(Uuid::new_v4(), 2500, "other speech"))?;

        let run = SentenceStore::list_from(&store, speech, 2000).await?;
        let texts: Vec<_> = run.iter().map(|s| s.text_content.as_str()).collect();
        assert_eq!(texts, ["second", "third"]);
        Ok(())
    }

    #[tokio::test]
    async fn lease_is_exclusive_until_released() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let block_id = Uuid::new_v4();
        let lease = store.acquire_lease(block_id).await?;
        let err = store.acquire_lease(block_id).await.unwrap_err();
        assert_eq!(err, StoreError::LeaseHeld { block_id });

        store.release_lease(&lease).await?;
        let again = store.acquire_lease(block_id).await?;
        assert_ne!(again.token, lease.token);
        Ok(())
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over_and_old_holder_loses_writes() -> anyhow::Result<()> {
        let store = MemoryStore::with_lease_ttl(Duration::zero());
        let block = Block::new(Uuid::new_v4(), "text");
        store.insert_block(block.clone())?;

        let first = store.acquire_lease(block.id).await?;
        let second = store.acquire_lease(block.id).await?;
        assert_ne!(first.token, second.token);

        let err = store.release_lease(&first).await.unwrap_err();
        assert_eq!(err, StoreError::LeaseLost { block_id: block.id });
        Ok(())
    }

    #[test]
    fn insert_word_requires_known_sentence() {
        let store = MemoryStore::new();
        let err = store
            .insert_word(Word {
                id: Uuid::new_v4(),
                sentence_id: Uuid::new_v4(),
                word: "orphan".into(),
                original_word: None,
                begin_time: 0,
                end_time: 10,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { entity: "word", .. }));
    }

    #[tokio::test]
    async fn word_delete_reports_count() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let s = sentence(Uuid::new_v4(), 0, "a b");
        store.insert_sentence(s.clone())?;
        let ids: Vec<WordId> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            store.insert_word(Word {
                id: *id,
                sentence_id: s.id,
                word: format!("w{i}"),
                original_word: None,
                begin_time: i as i64 * 100,
                end_time: i as i64 * 100 + 90,
            })?;
        }
        let deleted = WordStore::delete(&store, &ids[1..]).await?;
        assert_eq!(deleted, 2);
        assert_eq!(store.words_for(s.id).len(), 1);
        Ok(())
    }

    #[test]
    fn dataset_loads_from_json_file() -> anyhow::Result<()> {
        let block_id = Uuid::new_v4();
        let json = serde_json::json!({
            "blocks": [{
                "id": block_id,
                "content": "Hello there.",
                "conversion_status": "unconverted",
            }]
        })
        .to_string();
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(json.as_bytes())?;

        let dataset = Dataset::from_path(file.path())?;
        let store = MemoryStore::from_dataset(dataset)?;
        let block = store.block(block_id).expect("block loaded");
        assert_eq!(block.content, "Hello there.");
        assert!(store.snapshot().links.is_empty());
        Ok(())
    }

    #[test]
    fn dataset_row_missing_status_is_an_invalid_record() -> anyhow::Result<()> {
        let json = serde_json::json!({
            "sentences": [{
                "id": Uuid::new_v4(),
                "speech_id": Uuid::new_v4(),
                "text_content": "Hi.",
                "begin_time": 0,
                "end_time": 500,
            }]
        })
        .to_string();
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(json.as_bytes())?;

        let err = Dataset::from_path(file.path()).expect_err("conversion_status is required");
        match err {
            crate::Error::Storage(StoreError::InvalidRecord {
                entity, message, ..
            }) => {
                assert_eq!(entity, "dataset");
                assert!(message.contains("conversion_status"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn missing_dataset_file_surfaces_the_io_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = Dataset::from_path(dir.path().join("absent.json"))
            .expect_err("file does not exist");
        match err {
            crate::Error::Other(source) => assert_eq!(
                source.downcast_ref::<std::io::Error>().map(|e| e.kind()),
                Some(std::io::ErrorKind::NotFound)
            ),
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }
}
