//! lotear: size-bucketed batch construction, sharding, and collation for
//! sequence-to-sequence training.
//!
//! The crate turns a corpus of variable-length token sequences into
//! fixed-shape, evenly-sharded mini-batches:
//!
//! 1. [`corpus`]: immutable, indexable token-sequence stores
//!    ([`TextCorpus`], [`PairCorpus`]).
//! 2. [`batch`]: greedy single-pass bin packing under token, sentence,
//!    equal-length, and size-multiple constraints ([`build_batches`]).
//! 3. [`shuffle`]: deterministic seed+epoch shuffling with a frozen batch
//!    list cache for crash resume ([`EpochBatchPlanner`]).
//! 4. [`shard`]: stride partitioning across data-parallel workers, padded
//!    to equal step counts ([`partition`]).
//! 5. [`collate`]: padded fixed-shape buffers with a stable
//!    descending-length sort and the teacher-forcing eos rotation
//!    ([`Collator`]).
//!
//! [`loader`] glues the stages into per-epoch iterators. The model, its
//! optimizer, and everything else downstream only ever see
//! [`CollatedBatch`] records.
//!
//! # Example
//!
//! ```
//! use lotear::{
//!     BatchConstraints, CollateConfig, Collator, EpochBatchPlanner, PairCorpus,
//!     ShuffleOptions, TextCorpus, EOS_ID,
//! };
//!
//! let sequences: Vec<Vec<u32>> =
//!     (0u32..32).map(|i| (3..6 + i % 9).chain([EOS_ID]).collect()).collect();
//! let src = TextCorpus::from_sequences(sequences.clone());
//! let trg = TextCorpus::from_sequences(sequences);
//! let corpus = PairCorpus::new(src, Some(trg))?;
//!
//! let constraints = BatchConstraints { max_tokens: Some(64), ..Default::default() };
//! let planner = EpochBatchPlanner::new(constraints, 7);
//! let collator = Collator::new(CollateConfig::default());
//!
//! let iter = lotear::train_iterator(
//!     &corpus, &planner, &collator, 1, &ShuffleOptions::default(), 1, 0,
//! )?;
//! for batch in iter {
//!     let batch = batch?;
//!     assert_eq!(batch.net_input.src_tokens.nrows(), batch.id.len());
//! }
//! # Ok::<(), lotear::Error>(())
//! ```

pub mod batch;
pub mod collate;
pub mod corpus;
pub mod error;
pub mod loader;
pub mod shard;
pub mod shuffle;
pub mod vocab;

pub use batch::{build_batches, BatchConstraints, BatchRun, IndexBatch};
pub use collate::{CollateConfig, CollatedBatch, Collator, NetInput};
pub use corpus::{LoadOptions, PairCorpus, TextCorpus};
pub use error::{Error, Result};
pub use loader::{eval_iterator, train_iterator, EpochIterator};
pub use shard::partition;
pub use shuffle::{sorted_batches, EpochBatchPlanner, EvalOptions, ShuffleOptions};
pub use vocab::{Dictionary, Vocabulary, EOS_ID, PAD_ID, UNK_ID};
