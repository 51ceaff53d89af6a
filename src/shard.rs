//! Deterministic round-robin shard partitioning.
//!
//! Each worker in a data-parallel group keeps every `num_shards`-th batch
//! starting at its own `shard_id`. A stride partition (rather than contiguous
//! blocks) equalizes exposure to short and long batches across shards, since
//! the incoming list is length-sorted or shuffled. Shards are padded with
//! empty batches to identical lengths so synchronous workers all step the
//! same number of times.

use crate::batch::IndexBatch;
use crate::error::{Error, Result};

/// Keep this worker's slice of an ordered batch list.
///
/// Identity when `num_shards == 1`. The result always has exactly
/// `ceil(len / num_shards)` entries; trailing entries may be empty batches.
///
/// # Errors
///
/// Returns [`Error::InvalidShardId`] if `shard_id >= num_shards` or
/// `num_shards == 0`.
pub fn partition(
    batches: &[IndexBatch],
    num_shards: usize,
    shard_id: usize,
) -> Result<Vec<IndexBatch>> {
    if num_shards == 0 || shard_id >= num_shards {
        return Err(Error::InvalidShardId { shard_id, num_shards });
    }
    if num_shards == 1 {
        return Ok(batches.to_vec());
    }

    let mut shard: Vec<IndexBatch> = batches
        .iter()
        .enumerate()
        .filter(|(i, _)| i % num_shards == shard_id)
        .map(|(_, batch)| batch.clone())
        .collect();

    let expected = batches.len().div_ceil(num_shards);
    shard.resize(expected, IndexBatch::new());
    Ok(shard)
}
