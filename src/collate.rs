//! Padding and collation of index batches into fixed-shape buffers.
//!
//! The collator materializes a list of corpus indices into 2-D token-id
//! buffers padded to the widest sequence in the batch, sorted by descending
//! source length for length-bucketed execution downstream. Targets get two
//! buffers: the unshifted reference for the loss, and the teacher-forcing
//! input with the eos token rotated from the end to the front.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::corpus::PairCorpus;
use crate::error::{Error, Result};
use crate::vocab::{EOS_ID, PAD_ID};

/// Padding configuration, passed explicitly at construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CollateConfig {
    #[serde(default)]
    pub pad_id: u32,
    #[serde(default = "default_eos")]
    pub eos_id: u32,
    /// Pad source rows on the left instead of the right.
    #[serde(default)]
    pub left_pad_source: bool,
    /// Pad target rows on the left instead of the right.
    #[serde(default)]
    pub left_pad_target: bool,
}

fn default_eos() -> u32 {
    EOS_ID
}

impl Default for CollateConfig {
    fn default() -> Self {
        Self {
            pad_id: PAD_ID,
            eos_id: EOS_ID,
            left_pad_source: false,
            left_pad_target: false,
        }
    }
}

/// The model-facing inputs of a collated batch.
#[derive(Debug, Clone)]
pub struct NetInput {
    /// Padded source tokens, shape `(batch, max_src_len)`.
    pub src_tokens: Array2<u32>,
    /// Unpadded source lengths, one per row.
    pub src_lengths: Vec<usize>,
    /// Teacher-forcing target input (shifted right, eos first), if paired.
    pub trg_tokens: Option<Array2<u32>>,
    /// Unpadded target lengths, one per row, if paired.
    pub trg_lengths: Option<Vec<usize>>,
}

/// One padded mini-batch. Row `i` everywhere corresponds to `id[i]`.
#[derive(Debug, Clone)]
pub struct CollatedBatch {
    /// Original corpus indices in post-sort row order.
    pub id: Vec<usize>,
    /// Sum of unpadded target lengths (0 when unpaired); excludes padding.
    pub ntokens: usize,
    pub net_input: NetInput,
    /// Unshifted padded target tokens for the loss, if paired.
    pub target: Option<Array2<u32>>,
}

impl CollatedBatch {
    /// Number of rows in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

/// Converts index lists into padded buffers.
#[derive(Debug, Clone, Default)]
pub struct Collator {
    config: CollateConfig,
}

impl Collator {
    #[must_use]
    pub fn new(config: CollateConfig) -> Self {
        Self { config }
    }

    /// Collate `indices` into one padded batch.
    ///
    /// An empty index list produces an empty batch, not an error: sharded
    /// iteration pads short shards with empty batches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] for indices outside the corpus and
    /// [`Error::MalformedSequence`] if a target does not end with the eos id.
    pub fn collate(&self, corpus: &PairCorpus, indices: &[usize]) -> Result<CollatedBatch> {
        if indices.is_empty() {
            return Ok(CollatedBatch {
                id: Vec::new(),
                ntokens: 0,
                net_input: NetInput {
                    src_tokens: Array2::from_elem((0, 0), self.config.pad_id),
                    src_lengths: Vec::new(),
                    trg_tokens: None,
                    trg_lengths: None,
                },
                target: None,
            });
        }

        let sources: Vec<&[u32]> = indices
            .iter()
            .map(|&i| corpus.source().get(i))
            .collect::<Result<_>>()?;

        // Stable descending sort by source length; the same permutation is
        // applied to every field so rows stay aligned with `id`.
        let mut order: Vec<usize> = (0..indices.len()).collect();
        order.sort_by(|&a, &b| sources[b].len().cmp(&sources[a].len()));

        let id: Vec<usize> = order.iter().map(|&k| indices[k]).collect();
        let sorted_sources: Vec<&[u32]> = order.iter().map(|&k| sources[k]).collect();
        let src_lengths: Vec<usize> = sorted_sources.iter().map(|s| s.len()).collect();
        let src_tokens =
            self.pad_tokens(&sorted_sources, &id, self.config.left_pad_source, false)?;

        let mut ntokens = 0;
        let mut target = None;
        let mut trg_tokens = None;
        let mut trg_lengths = None;
        if let Some(trg) = corpus.target() {
            let targets: Vec<&[u32]> =
                id.iter().map(|&i| trg.get(i)).collect::<Result<_>>()?;
            ntokens = targets.iter().map(|t| t.len()).sum();
            trg_lengths = Some(targets.iter().map(|t| t.len()).collect());
            target =
                Some(self.pad_tokens(&targets, &id, self.config.left_pad_target, false)?);
            trg_tokens =
                Some(self.pad_tokens(&targets, &id, self.config.left_pad_target, true)?);
        }

        Ok(CollatedBatch {
            id,
            ntokens,
            net_input: NetInput { src_tokens, src_lengths, trg_tokens, trg_lengths },
            target,
        })
    }

    /// Build one padded buffer. With `shift_eos_to_front` the row becomes
    /// `[eos, t_0, .., t_{n-2}]`, which requires `t_{n-1} == eos`.
    fn pad_tokens(
        &self,
        values: &[&[u32]],
        ids: &[usize],
        left_pad: bool,
        shift_eos_to_front: bool,
    ) -> Result<Array2<u32>> {
        let width = values.iter().map(|v| v.len()).max().unwrap_or(0);
        let mut buffer = Array2::from_elem((values.len(), width), self.config.pad_id);

        for (row, value) in values.iter().enumerate() {
            let offset = if left_pad { width - value.len() } else { 0 };
            if shift_eos_to_front {
                if value.last() != Some(&self.config.eos_id) {
                    return Err(Error::MalformedSequence {
                        index: ids[row],
                        eos_id: self.config.eos_id,
                    });
                }
                buffer[[row, offset]] = self.config.eos_id;
                for (col, &token) in value[..value.len() - 1].iter().enumerate() {
                    buffer[[row, offset + col + 1]] = token;
                }
            } else {
                for (col, &token) in value.iter().enumerate() {
                    buffer[[row, offset + col]] = token;
                }
            }
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::TextCorpus;

    fn eos_terminated(len: usize) -> Vec<u32> {
        let mut seq: Vec<u32> = (10..10 + len as u32 - 1).collect();
        seq.push(EOS_ID);
        seq
    }

    fn paired_corpus(src_lens: &[usize], trg_lens: &[usize]) -> PairCorpus {
        let src =
            TextCorpus::from_sequences(src_lens.iter().map(|&n| eos_terminated(n)).collect());
        let trg =
            TextCorpus::from_sequences(trg_lens.iter().map(|&n| eos_terminated(n)).collect());
        PairCorpus::new(src, Some(trg)).expect("pair")
    }

    #[test]
    fn test_shapes_padding_and_ntokens() {
        let corpus = paired_corpus(&[4, 7, 2], &[4, 7, 2]);
        let collator = Collator::new(CollateConfig::default());
        let batch = collator.collate(&corpus, &[0, 1, 2]).expect("collate");

        assert_eq!(batch.net_input.src_tokens.dim(), (3, 7));
        assert_eq!(batch.ntokens, 4 + 7 + 2);

        // Descending source length: row order is 7, 4, 2.
        assert_eq!(batch.id, vec![1, 0, 2]);
        assert_eq!(batch.net_input.src_lengths, vec![7, 4, 2]);

        // Length-2 row (last) has exactly 5 trailing pads.
        let row = batch.net_input.src_tokens.row(2);
        assert!(row.iter().skip(2).all(|&t| t == PAD_ID));
        assert_eq!(row.iter().filter(|&&t| t == PAD_ID).count(), 5);
    }

    #[test]
    fn test_left_pad_source() {
        let corpus = paired_corpus(&[2, 4], &[2, 4]);
        let collator = Collator::new(CollateConfig {
            left_pad_source: true,
            ..Default::default()
        });
        let batch = collator.collate(&corpus, &[0, 1]).expect("collate");

        // Row 1 is the length-2 sequence; its pads lead.
        let row = batch.net_input.src_tokens.row(1);
        assert_eq!(row[0], PAD_ID);
        assert_eq!(row[1], PAD_ID);
        assert_ne!(row[2], PAD_ID);
    }

    #[test]
    fn test_teacher_forcing_shift() {
        let src = TextCorpus::from_sequences(vec![vec![5, 9, 3, EOS_ID]]);
        let trg = TextCorpus::from_sequences(vec![vec![5, 9, 3, EOS_ID]]);
        let corpus = PairCorpus::new(src, Some(trg)).expect("pair");
        let collator = Collator::new(CollateConfig::default());
        let batch = collator.collate(&corpus, &[0]).expect("collate");

        let shifted = batch.net_input.trg_tokens.expect("trg");
        assert_eq!(shifted.row(0).to_vec(), vec![EOS_ID, 5, 9, 3]);
        let reference = batch.target.expect("target");
        assert_eq!(reference.row(0).to_vec(), vec![5, 9, 3, EOS_ID]);
    }

    #[test]
    fn test_missing_eos_is_fatal() {
        let src = TextCorpus::from_sequences(vec![vec![5, EOS_ID]]);
        let trg = TextCorpus::from_sequences(vec![vec![5, 9]]);
        let corpus = PairCorpus::new(src, Some(trg)).expect("pair");
        let collator = Collator::new(CollateConfig::default());
        let err = collator.collate(&corpus, &[0]).expect_err("should fail");
        assert!(matches!(err, Error::MalformedSequence { index: 0, .. }));
    }

    #[test]
    fn test_sort_is_stable_for_equal_lengths() {
        let corpus = paired_corpus(&[3, 3, 5], &[3, 3, 5]);
        let collator = Collator::new(CollateConfig::default());
        let batch = collator.collate(&corpus, &[0, 1, 2]).expect("collate");

        assert_eq!(batch.net_input.src_lengths, vec![5, 3, 3]);
        // The two length-3 rows keep their original relative order.
        assert_eq!(batch.id, vec![2, 0, 1]);
    }

    #[test]
    fn test_trg_lengths_follow_sort_order() {
        let corpus = paired_corpus(&[2, 6, 4], &[9, 3, 5]);
        let collator = Collator::new(CollateConfig::default());
        let batch = collator.collate(&corpus, &[0, 1, 2]).expect("collate");

        assert_eq!(batch.id, vec![1, 2, 0]);
        assert_eq!(batch.net_input.trg_lengths, Some(vec![3, 5, 9]));
    }

    #[test]
    fn test_empty_batch_is_not_an_error() {
        let corpus = paired_corpus(&[3], &[3]);
        let collator = Collator::new(CollateConfig::default());
        let batch = collator.collate(&corpus, &[]).expect("collate");
        assert!(batch.is_empty());
        assert_eq!(batch.ntokens, 0);
        assert!(batch.target.is_none());
    }

    #[test]
    fn test_unpaired_corpus_has_no_target_fields() {
        let src = TextCorpus::from_sequences(vec![vec![5, 9, EOS_ID]]);
        let corpus = PairCorpus::new(src, None).expect("pair");
        let collator = Collator::new(CollateConfig::default());
        let batch = collator.collate(&corpus, &[0]).expect("collate");

        assert!(batch.target.is_none());
        assert!(batch.net_input.trg_tokens.is_none());
        assert_eq!(batch.ntokens, 0);
    }

    #[test]
    fn test_inputs_not_mutated() {
        let corpus = paired_corpus(&[3, 5], &[3, 5]);
        let before = corpus.source().get(0).expect("get").to_vec();
        let collator = Collator::new(CollateConfig::default());
        collator.collate(&corpus, &[0, 1]).expect("collate");
        assert_eq!(corpus.source().get(0).expect("get"), before.as_slice());
    }
}
