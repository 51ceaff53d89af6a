//! Epoch iteration: planned batches, sharded, collated on demand.
//!
//! Pull-based: each `next()` collates one batch and returns control. Empty
//! padding batches (short shards) collate to empty [`CollatedBatch`]es so
//! every worker in a data-parallel group steps the same number of times.
//! Dropping the iterator early leaks nothing; the planner's frozen cache is
//! the only retained state and is released via
//! [`EpochBatchPlanner::clear_cache`].

use crate::batch::{BatchConstraints, IndexBatch};
use crate::collate::{CollatedBatch, Collator};
use crate::corpus::PairCorpus;
use crate::error::Result;
use crate::shard::partition;
use crate::shuffle::{sorted_batches, EpochBatchPlanner, EvalOptions, ShuffleOptions};

/// Iterator over the collated batches of one epoch for one shard.
pub struct EpochIterator<'a> {
    corpus: &'a PairCorpus,
    collator: &'a Collator,
    batches: Vec<IndexBatch>,
    dropped: Vec<usize>,
    cursor: usize,
}

impl<'a> EpochIterator<'a> {
    /// Total number of steps in this epoch (padding batches included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Steps already taken; with the epoch number this is enough to resume.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Corpus indices dropped for violating `max_positions`.
    ///
    /// Populated on the evaluation path when `skip_invalid_size_inputs` is
    /// set. The training planner drops while building its frozen list, so
    /// training iterators report an empty slice here.
    #[must_use]
    pub fn dropped(&self) -> &[usize] {
        &self.dropped
    }
}

impl<'a> Iterator for EpochIterator<'a> {
    type Item = Result<CollatedBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.batches.len() {
            return None;
        }
        self.cursor += 1;
        let batch = &self.batches[self.cursor - 1];
        Some(self.collator.collate(self.corpus, batch))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.batches.len() - self.cursor;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for EpochIterator<'a> {}

/// Training iterator: shuffled, resumable, sharded.
///
/// # Errors
///
/// Propagates planning errors and [`crate::Error::InvalidShardId`].
pub fn train_iterator<'a>(
    corpus: &'a PairCorpus,
    planner: &EpochBatchPlanner,
    collator: &'a Collator,
    epoch: u64,
    options: &ShuffleOptions,
    num_shards: usize,
    shard_id: usize,
) -> Result<EpochIterator<'a>> {
    let batches = planner.shuffled_batches(corpus, epoch, options)?;
    let batches = partition(&batches, num_shards, shard_id)?;
    Ok(EpochIterator { corpus, collator, batches, dropped: Vec::new(), cursor: 0 })
}

/// Evaluation iterator: size-sorted (or corpus-order), sharded, no shuffle.
///
/// Indices dropped under `skip_invalid_size_inputs` are available through
/// [`EpochIterator::dropped`].
///
/// # Errors
///
/// Propagates batch construction errors and [`crate::Error::InvalidShardId`].
pub fn eval_iterator<'a>(
    corpus: &'a PairCorpus,
    constraints: &BatchConstraints,
    collator: &'a Collator,
    options: &EvalOptions,
    num_shards: usize,
    shard_id: usize,
) -> Result<EpochIterator<'a>> {
    let run = sorted_batches(corpus, constraints, options)?;
    let batches = partition(&run.batches, num_shards, shard_id)?;
    Ok(EpochIterator { corpus, collator, batches, dropped: run.dropped, cursor: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collate::CollateConfig;
    use crate::corpus::TextCorpus;
    use crate::vocab::EOS_ID;

    fn corpus(n: usize) -> PairCorpus {
        let seq = |len: usize| -> Vec<u32> {
            let mut s: Vec<u32> = (10..10 + len as u32 - 1).collect();
            s.push(EOS_ID);
            s
        };
        let lens: Vec<usize> = (0..n).map(|i| 2 + (i * 3) % 7).collect();
        let src = TextCorpus::from_sequences(lens.iter().map(|&l| seq(l)).collect());
        let trg = TextCorpus::from_sequences(lens.iter().map(|&l| seq(l + 1)).collect());
        PairCorpus::new(src, Some(trg)).expect("pair")
    }

    fn constraints() -> BatchConstraints {
        BatchConstraints {
            max_tokens: Some(32),
            batch_multiple: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_train_iterator_covers_corpus() {
        let corpus = corpus(20);
        let planner = EpochBatchPlanner::new(constraints(), 7);
        let collator = Collator::new(CollateConfig::default());

        let iter = train_iterator(
            &corpus,
            &planner,
            &collator,
            1,
            &ShuffleOptions::default(),
            1,
            0,
        )
        .expect("iterator");

        let mut seen: Vec<usize> = Vec::new();
        for batch in iter {
            let batch = batch.expect("collate");
            seen.extend_from_slice(&batch.id);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_all_shards_step_equally() {
        let corpus = corpus(23);
        let planner = EpochBatchPlanner::new(constraints(), 3);
        let collator = Collator::new(CollateConfig::default());

        let lens: Vec<usize> = (0..4)
            .map(|shard_id| {
                train_iterator(
                    &corpus,
                    &planner,
                    &collator,
                    1,
                    &ShuffleOptions::default(),
                    4,
                    shard_id,
                )
                .expect("iterator")
                .len()
            })
            .collect();
        assert!(lens.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_padding_batches_collate_empty() {
        let corpus = corpus(3);
        let planner = EpochBatchPlanner::new(constraints(), 1);
        let collator = Collator::new(CollateConfig::default());

        // More shards than batches guarantees at least one padding batch.
        let iter = train_iterator(
            &corpus,
            &planner,
            &collator,
            1,
            &ShuffleOptions::default(),
            8,
            7,
        )
        .expect("iterator");

        for batch in iter {
            let batch = batch.expect("collate");
            assert!(batch.is_empty() || batch.len() <= 3);
        }
    }

    #[test]
    fn test_eval_iterator_deterministic() {
        let corpus = corpus(15);
        let collator = Collator::new(CollateConfig::default());
        let constraints = constraints();
        let options = EvalOptions::default();

        let collect = || -> Vec<Vec<usize>> {
            eval_iterator(&corpus, &constraints, &collator, &options, 1, 0)
                .expect("iterator")
                .map(|b| b.expect("collate").id)
                .collect()
        };
        assert_eq!(collect(), collect());
    }

    #[test]
    fn test_eval_iterator_reports_dropped() {
        let seq = |len: usize| -> Vec<u32> {
            let mut s: Vec<u32> = (10..10 + len as u32 - 1).collect();
            s.push(EOS_ID);
            s
        };
        let src = TextCorpus::from_sequences(vec![seq(3), seq(9), seq(4)]);
        let trg = TextCorpus::from_sequences(vec![seq(3), seq(9), seq(4)]);
        let corpus = PairCorpus::new(src, Some(trg)).expect("pair");
        let collator = Collator::new(CollateConfig::default());
        let constraints = BatchConstraints {
            max_positions: (6, 6),
            skip_invalid_size_inputs: true,
            batch_multiple: 1,
            ..Default::default()
        };

        let iter = eval_iterator(&corpus, &constraints, &collator, &EvalOptions::default(), 1, 0)
            .expect("iterator");
        assert_eq!(iter.dropped(), &[1]);

        let mut seen: Vec<usize> = Vec::new();
        for batch in iter {
            seen.extend_from_slice(&batch.expect("collate").id);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 2]);
    }

    #[test]
    fn test_position_tracks_steps() {
        let corpus = corpus(10);
        let planner = EpochBatchPlanner::new(constraints(), 2);
        let collator = Collator::new(CollateConfig::default());

        let mut iter = train_iterator(
            &corpus,
            &planner,
            &collator,
            1,
            &ShuffleOptions::default(),
            1,
            0,
        )
        .expect("iterator");

        assert_eq!(iter.position(), 0);
        iter.next();
        assert_eq!(iter.position(), 1);
    }
}
