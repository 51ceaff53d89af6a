//! Error types for batch construction and collation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the batching engine.
///
/// `InvalidSizeInput` is the only recoverable variant: when
/// `skip_invalid_size_inputs` is set the builder records the offending index
/// instead of returning it. Everything else indicates a precondition
/// violation and propagates immediately.
#[derive(Debug, Error)]
pub enum Error {
    #[error("index {index} out of range for corpus of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(
        "sample #{index} has size (src={src_size}, trg={trg_size}) but max size is \
         ({max_src}, {max_trg}); enable skip_invalid_size_inputs to drop such samples"
    )]
    InvalidSizeInput {
        index: usize,
        src_size: usize,
        trg_size: usize,
        max_src: usize,
        max_trg: usize,
    },

    #[error("invalid shard id {shard_id} for {num_shards} shards")]
    InvalidShardId { shard_id: usize, num_shards: usize },

    #[error("target sequence #{index} does not end with the eos id {eos_id}")]
    MalformedSequence { index: usize, eos_id: u32 },

    // Field names avoid `source`, which thiserror treats as the error cause.
    #[error("source and target corpora differ in length ({source_len} vs {target_len})")]
    CorpusLengthMismatch { source_len: usize, target_len: usize },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for batching operations.
pub type Result<T> = std::result::Result<T, Error>;
