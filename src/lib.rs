//! `blockalign` aligns time-stamped speech transcripts onto the written text of a book.
//!
//! Given a text block and a run of ASR sentences, this crate provides:
//! - Fuzzy location of each sentence in the block (bigram similarity over sliding windows)
//! - Boundary repair so matched spans start and end on real sentence edges
//! - Persistence of the result through pluggable async store adapters
//! - Word-level re-alignment of each sentence's timed word records
//!
//! The library does no I/O of its own; everything goes through the [`store`] traits, with
//! [`MemoryStore`] as the in-process implementation used by the CLI and tests.

// High-level API (most consumers should start here).
pub mod aligner;
pub mod opts;

// Typed records and the adapter contracts they travel through.
pub mod memory_store;
pub mod model;
pub mod store;

// Matching.
pub mod boundary;
pub mod matcher;
pub mod normalize;
pub mod similarity;

// Block content markers and word-level alignment.
pub mod markers;
pub mod tokenize;
pub mod word_aligner;

mod pipeline;
pub mod summary;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

mod error;

pub use aligner::{AlignedSentence, Aligner, AlignmentResult};
pub use error::{Error, Result, Stage, StoreError, StoreResult};
pub use memory_store::{Dataset, MemoryStore};
pub use opts::Opts;
pub use similarity::{DiceBigram, SimilarityMetric};
pub use store::Stores;
