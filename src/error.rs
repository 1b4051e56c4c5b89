use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::model::{BlockId, SpeechId};

/// Blockalign's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type returned by persistence adapters.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Blockalign's crate-wide error type.
///
/// A candidate sentence scoring below the acceptance threshold is *not* an error; it is
/// reported through the match score and ends the cascade normally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no sentences found for speech {speech_id} starting at or after {min_begin_time} ms")]
    EmptyCandidateRun {
        speech_id: SpeechId,
        min_begin_time: i64,
    },

    #[error("{stage} failed for block {block_id}: {source}")]
    Store {
        stage: Stage,
        block_id: BlockId,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn store(stage: Stage, block_id: BlockId, source: StoreError) -> Self {
        Self::Store {
            stage,
            block_id,
            source,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

/// Failure reported by a persistence adapter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A record read from or written to the backend is missing fields or is inconsistent.
    #[error("invalid {entity} record {id}: {message}")]
    InvalidRecord {
        entity: &'static str,
        id: String,
        message: String,
    },

    #[error("block {block_id} is leased by another alignment run")]
    LeaseHeld { block_id: BlockId },

    #[error("lease on block {block_id} is no longer held")]
    LeaseLost { block_id: BlockId },

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(
        entity: &'static str,
        id: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRecord {
            entity,
            id: id.to_string(),
            message: message.into(),
        }
    }
}

/// Named step of an alignment run, used to report where a store call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AcquireLease,
    FetchBlock,
    FetchAnchor,
    FetchRun,
    CommitText,
    AlignWords,
    InsertLinks,
    ReleaseLease,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::AcquireLease => "acquire lease",
            Stage::FetchBlock => "fetch block",
            Stage::FetchAnchor => "fetch anchor sentence",
            Stage::FetchRun => "fetch candidate run",
            Stage::CommitText => "commit block and sentence text",
            Stage::AlignWords => "word alignment",
            Stage::InsertLinks => "insert block-sentence links",
            Stage::ReleaseLease => "release lease",
        };
        f.write_str(name)
    }
}
