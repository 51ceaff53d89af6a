//! Deterministic shuffle, epoch resume, and evaluation-order planning.
//!
//! [`EpochBatchPlanner`] owns the frozen batch list cache: batch membership
//! for an index range `(start, end)` is computed once from the base seed and
//! reused for every epoch; epoch shuffles only permute batch order. The same
//! `(seed, epoch, start, end, sample)` tuple always yields the identical
//! batch sequence, which is what makes mid-epoch crash resume possible.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::batch::{build_batches, BatchConstraints, BatchRun, IndexBatch};
use crate::corpus::PairCorpus;
use crate::error::Result;

/// Per-epoch shuffle parameters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ShuffleOptions {
    /// When non-zero, return exactly this many batches per epoch, drawing
    /// from the frozen list as a circular buffer.
    #[serde(default)]
    pub sample_without_replacement: usize,
    /// First corpus index of the range (default 0).
    #[serde(default)]
    pub start: Option<usize>,
    /// One past the last corpus index of the range (default corpus length;
    /// clamped to it).
    #[serde(default)]
    pub end: Option<usize>,
    /// Keep the size-sorted frozen order instead of shuffling.
    #[serde(default)]
    pub sort_by_source_size: bool,
}

/// Evaluation iteration order parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvalOptions {
    /// Visit sequences in source-length order (forces equal source lengths
    /// within each batch). Corpus order otherwise.
    #[serde(default = "default_true")]
    pub sort_by_length: bool,
    /// Reverse the visiting order.
    #[serde(default)]
    pub descending: bool,
    /// Duplicate the resulting batch list this many times.
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

fn default_true() -> bool {
    true
}

fn default_repeat() -> usize {
    1
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self { sort_by_length: true, descending: false, repeat: 1 }
    }
}

/// Plans shuffled, resumable epoch batch sequences over a pair corpus.
///
/// The planner is keyed to one set of [`BatchConstraints`] and one base seed;
/// reuse the same planner across epochs so the frozen cache is shared.
#[derive(Debug)]
pub struct EpochBatchPlanner {
    constraints: BatchConstraints,
    seed: u64,
    frozen: Mutex<HashMap<(usize, usize), Arc<Vec<IndexBatch>>>>,
}

impl EpochBatchPlanner {
    #[must_use]
    pub fn new(constraints: BatchConstraints, seed: u64) -> Self {
        Self { constraints, seed, frozen: Mutex::new(HashMap::new()) }
    }

    /// Batch sequence for `epoch` (1-based).
    ///
    /// Builds (or reuses) the frozen batch list for the requested range, then
    /// reorders it with an rng seeded `seed + epoch`. Reordering is skipped
    /// under `sort_by_source_size`. With `sample_without_replacement = n`,
    /// returns exactly `n` batches by walking the frozen list as a circular
    /// buffer offset by `(epoch - 1) * n`, reshuffling at each wrap.
    ///
    /// # Errors
    ///
    /// Propagates batch construction errors from the first (frozen) build.
    pub fn shuffled_batches(
        &self,
        corpus: &PairCorpus,
        epoch: u64,
        options: &ShuffleOptions,
    ) -> Result<Vec<IndexBatch>> {
        let epoch = epoch.max(1);
        let frozen = self.frozen_for(corpus, options)?;
        let mut batches: Vec<IndexBatch> = frozen.as_ref().clone();

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(epoch));
        if !options.sort_by_source_size {
            batches.shuffle(&mut rng);
        }

        let sample = options.sample_without_replacement;
        if sample > 0 {
            if batches.is_empty() {
                return Ok(Vec::new());
            }
            let mut offset = (epoch as usize - 1) * sample;
            while offset > batches.len() {
                batches.shuffle(&mut rng);
                offset -= batches.len();
            }

            let window_end = (offset + sample).min(batches.len());
            let mut result: Vec<IndexBatch> = batches[offset..window_end].to_vec();
            while result.len() < sample {
                batches.shuffle(&mut rng);
                let take = (sample - result.len()).min(batches.len());
                result.extend_from_slice(&batches[..take]);
            }
            batches = result;
        }

        Ok(batches)
    }

    /// Release the frozen batch list cache.
    pub fn clear_cache(&self) {
        self.frozen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Frozen batch list for a range: a seeded permutation of
    /// `[start, end)`, stable-sorted by target length then source length, fed
    /// to the builder with different source lengths allowed. The range is
    /// clamped to the corpus length before use. Memoized per `(start, end)`;
    /// the mutex is the single-writer guard for lazy construction.
    fn frozen_for(
        &self,
        corpus: &PairCorpus,
        options: &ShuffleOptions,
    ) -> Result<Arc<Vec<IndexBatch>>> {
        let len = corpus.len();
        let start = options.start.unwrap_or(0).min(len);
        let end = options.end.unwrap_or(len).min(len).max(start);

        let mut cache = self.frozen.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(batches) = cache.get(&(start, end)) {
            return Ok(Arc::clone(batches));
        }

        let mut indices: Vec<usize> = (start..end).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let src_sizes = corpus.source().sizes();
        let trg_sizes = corpus.target().map_or(src_sizes, |t| t.sizes());
        // Two stable sorts, target first: the final order is primarily by
        // source length with target length as the tie-break.
        indices.sort_by_key(|&i| trg_sizes[i]);
        indices.sort_by_key(|&i| src_sizes[i]);

        let mut constraints = self.constraints.clone();
        constraints.skip_invalid_size_inputs = true;
        let run = build_batches(corpus, &indices, &constraints, true)?;

        let batches = Arc::new(run.batches);
        cache.insert((start, end), Arc::clone(&batches));
        Ok(batches)
    }
}

/// Size-sorted (or corpus-order) batches for evaluation.
///
/// With `sort_by_length` the visiting order is a stable ascending argsort of
/// source lengths and batches may not mix source lengths; otherwise corpus
/// order is kept and mixed lengths are allowed. `descending` reverses the
/// visiting order, and `repeat` duplicates the finished batch list.
///
/// # Errors
///
/// Propagates batch construction errors, including `InvalidSizeInput` when
/// `skip_invalid_size_inputs` is off.
pub fn sorted_batches(
    corpus: &PairCorpus,
    constraints: &BatchConstraints,
    options: &EvalOptions,
) -> Result<BatchRun> {
    let mut indices: Vec<usize> = (0..corpus.len()).collect();
    if options.sort_by_length {
        let src_sizes = corpus.source().sizes();
        indices.sort_by_key(|&i| src_sizes[i]);
    }
    if options.descending {
        indices.reverse();
    }

    let allow_different_src_lens = !options.sort_by_length;
    let run = build_batches(corpus, &indices, constraints, allow_different_src_lens)?;

    let mut batches = run.batches.clone();
    for _ in 1..options.repeat.max(1) {
        batches.extend_from_slice(&run.batches);
    }

    Ok(BatchRun { batches, dropped: run.dropped })
}
