//! Greedy size-bucketed batch construction.
//!
//! [`build_batches`] scans the caller-supplied index order once, left to
//! right, packing indices into batches under a padded-token budget, a
//! sentence-count budget, an optional equal-source-length constraint, and a
//! batch-size-multiple rounding rule. It is a greedy, non-optimal bin packer:
//! no lookahead, O(n) construction, fully deterministic.

use serde::{Deserialize, Serialize};

use crate::corpus::PairCorpus;
use crate::error::{Error, Result};

/// An ordered list of corpus indices forming one batch.
pub type IndexBatch = Vec<usize>;

/// Limits applied during batch construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConstraints {
    /// Padded-token budget per batch: `len(batch) * max_sample_len`. `None`
    /// means unbounded.
    #[serde(default)]
    pub max_tokens: Option<usize>,
    /// Sentence-count budget per batch. `None` means unbounded.
    #[serde(default)]
    pub max_sentences: Option<usize>,
    /// `(max_src_len, max_trg_len)`; samples exceeding either side are invalid.
    #[serde(default = "default_max_positions")]
    pub max_positions: (usize, usize),
    /// Non-final batches are trimmed to a multiple of this size so downstream
    /// consumers can use fixed-width parallel layouts.
    #[serde(default = "default_batch_multiple")]
    pub batch_multiple: usize,
    /// Drop invalid-size samples (recorded in [`BatchRun::dropped`]) instead
    /// of failing.
    #[serde(default)]
    pub skip_invalid_size_inputs: bool,
}

fn default_max_positions() -> (usize, usize) {
    (1024, 1024)
}

fn default_batch_multiple() -> usize {
    8
}

impl Default for BatchConstraints {
    fn default() -> Self {
        Self {
            max_tokens: None,
            max_sentences: None,
            max_positions: default_max_positions(),
            batch_multiple: default_batch_multiple(),
            skip_invalid_size_inputs: false,
        }
    }
}

/// Output of one builder pass: the batches plus the indices dropped for
/// violating `max_positions` (empty unless `skip_invalid_size_inputs`).
#[derive(Debug, Clone, Default)]
pub struct BatchRun {
    pub batches: Vec<IndexBatch>,
    pub dropped: Vec<usize>,
}

/// How many dropped ids the advisory warning prints.
const DROPPED_PREVIEW: usize = 10;

fn valid_size(src_size: usize, trg_size: usize, max_positions: (usize, usize)) -> bool {
    let (max_src, max_trg) = max_positions;
    src_size >= 1 && src_size <= max_src && trg_size >= 1 && trg_size <= max_trg
}

/// Pack `indices` into batches, preserving their order.
///
/// The open batch closes before admitting the next index when it has reached
/// `max_sentences`, when the projected cost `(len + 1) * max_sample_len`
/// exceeds `max_tokens`, or when `allow_different_src_lens` is false and the
/// candidate's source length differs from the batch's first member. On close
/// the batch is trimmed to the largest prefix that is a multiple of
/// `batch_multiple` (batches already below the multiple are kept whole); the
/// trimmed suffix is never discarded; it seeds the next open batch.
///
/// # Errors
///
/// Returns [`Error::IndexOutOfRange`] for indices outside the corpus and
/// [`Error::InvalidSizeInput`] for samples violating `max_positions` when
/// `skip_invalid_size_inputs` is off.
pub fn build_batches(
    corpus: &PairCorpus,
    indices: &[usize],
    constraints: &BatchConstraints,
    allow_different_src_lens: bool,
) -> Result<BatchRun> {
    let max_tokens = constraints.max_tokens.unwrap_or(usize::MAX);
    let max_sentences = constraints.max_sentences.unwrap_or(usize::MAX);
    let multiple = constraints.batch_multiple.max(1);
    let src_sizes = corpus.source().sizes();

    let mut batches: Vec<IndexBatch> = Vec::new();
    let mut batch: IndexBatch = Vec::new();
    // Per-sample max(src, trg) lengths for the open batch, plus the pending
    // candidate; one element ahead of `batch` at the close decision.
    let mut sample_lens: Vec<usize> = Vec::new();
    let mut sample_len = 0usize;
    let mut dropped: Vec<usize> = Vec::new();

    let must_close = |batch: &IndexBatch, next_idx: usize, num_tokens: usize| -> bool {
        if batch.is_empty() {
            return false;
        }
        if batch.len() == max_sentences {
            return true;
        }
        if num_tokens > max_tokens {
            return true;
        }
        if !allow_different_src_lens && src_sizes[batch[0]] != src_sizes[next_idx] {
            return true;
        }
        false
    };

    for &idx in indices {
        let (src_size, trg_size) = corpus.pair_sizes(idx)?;
        if !valid_size(src_size, trg_size, constraints.max_positions) {
            if constraints.skip_invalid_size_inputs {
                dropped.push(idx);
                continue;
            }
            return Err(Error::InvalidSizeInput {
                index: idx,
                src_size,
                trg_size,
                max_src: constraints.max_positions.0,
                max_trg: constraints.max_positions.1,
            });
        }

        sample_lens.push(src_size.max(trg_size));
        sample_len = sample_len.max(src_size.max(trg_size));
        let num_tokens = (batch.len() + 1) * sample_len;
        if must_close(&batch, idx, num_tokens) {
            // Close on the largest prefix that is a multiple of `multiple`;
            // a batch already below the multiple is kept whole. The suffix
            // carries over so rounding never drops samples.
            let keep = (multiple * (batch.len() / multiple)).max(batch.len() % multiple);
            let carried = batch.split_off(keep);
            batches.push(std::mem::replace(&mut batch, carried));
            sample_lens.drain(..keep);
            sample_len = sample_lens.iter().copied().max().unwrap_or(0);
        }

        batch.push(idx);
    }

    if !batch.is_empty() {
        batches.push(batch);
    }

    if !dropped.is_empty() {
        let preview: Vec<usize> = dropped.iter().copied().take(DROPPED_PREVIEW).collect();
        eprintln!(
            "Warning: {} samples are either too short or too long and will be ignored, \
             first few sample ids={:?}",
            dropped.len(),
            preview
        );
    }

    Ok(BatchRun { batches, dropped })
}
