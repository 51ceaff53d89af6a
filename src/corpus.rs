//! Immutable token-sequence corpora.
//!
//! A [`TextCorpus`] owns tokenized sequences, a parallel length array for
//! O(1) size lookups during batch construction, and the raw text lines for
//! detokenization and debugging. A [`PairCorpus`] joins a source corpus with
//! an optional target corpus over the same index space.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vocab::Vocabulary;

/// Options applied while reading a corpus file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Append the eos id to every sequence.
    #[serde(default = "default_true")]
    pub append_eos: bool,
    /// Reverse token order within each sequence (eos, if appended, stays last).
    #[serde(default)]
    pub reverse_order: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { append_eos: true, reverse_order: false }
    }
}

/// An ordered, immutable collection of token-id sequences.
///
/// Indices are stable for the corpus lifetime; nothing reorders on load.
#[derive(Debug, Clone)]
pub struct TextCorpus {
    sequences: Vec<Vec<u32>>,
    sizes: Vec<usize>,
    lines: Vec<String>,
}

impl TextCorpus {
    /// Read a corpus file: one whitespace-tokenized UTF-8 sentence per line.
    ///
    /// Tokens are mapped through `vocab` (out-of-vocabulary tokens become
    /// `unk_id`). The raw line text is retained for [`Self::original_text`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub fn load<P: AsRef<Path>>(
        path: P,
        vocab: &dyn Vocabulary,
        options: LoadOptions,
    ) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::Io {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;

        let mut sequences = Vec::new();
        let mut sizes = Vec::new();
        let mut lines = Vec::new();
        for line in content.lines() {
            let mut tokens: Vec<u32> = line.split_whitespace().map(|t| vocab.index(t)).collect();
            if options.reverse_order {
                tokens.reverse();
            }
            if options.append_eos {
                tokens.push(vocab.eos_id());
            }
            sizes.push(tokens.len());
            sequences.push(tokens);
            lines.push(line.to_string());
        }

        Ok(Self { sequences, sizes, lines })
    }

    /// Build a corpus directly from token-id sequences (no raw text retained).
    #[must_use]
    pub fn from_sequences(sequences: Vec<Vec<u32>>) -> Self {
        let sizes = sequences.iter().map(Vec::len).collect();
        let lines = vec![String::new(); sequences.len()];
        Self { sequences, sizes, lines }
    }

    /// Number of sequences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Cached per-sequence lengths, parallel to the sequence array.
    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Fetch sequence `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn get(&self, index: usize) -> Result<&[u32]> {
        self.check_index(index)?;
        Ok(&self.sequences[index])
    }

    /// Length of sequence `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn size(&self, index: usize) -> Result<usize> {
        self.check_index(index)?;
        Ok(self.sizes[index])
    }

    /// Raw text of line `index` as read from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn original_text(&self, index: usize) -> Result<&str> {
        self.check_index(index)?;
        Ok(&self.lines[index])
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.sequences.len() {
            return Err(Error::IndexOutOfRange { index, len: self.sequences.len() });
        }
        Ok(())
    }
}

/// A source corpus with an optional aligned target corpus.
///
/// Index `i` in the source corresponds to index `i` in the target (same
/// sentence pair). Inference-only corpora have no target.
#[derive(Debug, Clone)]
pub struct PairCorpus {
    source: TextCorpus,
    target: Option<TextCorpus>,
}

impl PairCorpus {
    /// Join a source corpus with an optional target corpus.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorpusLengthMismatch`] if a target is present and its
    /// length differs from the source.
    pub fn new(source: TextCorpus, target: Option<TextCorpus>) -> Result<Self> {
        if let Some(trg) = &target {
            if trg.len() != source.len() {
                return Err(Error::CorpusLengthMismatch {
                    source_len: source.len(),
                    target_len: trg.len(),
                });
            }
        }
        Ok(Self { source, target })
    }

    #[must_use]
    pub fn source(&self) -> &TextCorpus {
        &self.source
    }

    #[must_use]
    pub fn target(&self) -> Option<&TextCorpus> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    /// Number of sentence pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.source.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// `(src_size, trg_size)` for pair `index`; `trg_size = src_size` when
    /// there is no target corpus.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn pair_sizes(&self, index: usize) -> Result<(usize, usize)> {
        let src_size = self.source.size(index)?;
        let trg_size = match &self.target {
            Some(trg) => trg.size(index)?,
            None => src_size,
        };
        Ok((src_size, trg_size))
    }
}
