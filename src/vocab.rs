//! Vocabulary lookup surface.
//!
//! The engine never interprets token strings itself; it only needs a mapping
//! from token text to integer id with the three reserved ids below. Real
//! vocabulary construction lives with the tokenizer collaborator.

use std::collections::HashMap;

/// Reserved id for the padding token.
pub const PAD_ID: u32 = 0;
/// Reserved id for the end-of-sequence token.
pub const EOS_ID: u32 = 1;
/// Reserved id for unknown tokens.
pub const UNK_ID: u32 = 2;

/// Token-string to token-id lookup.
///
/// Implementations must map out-of-vocabulary tokens to `unk_id()` rather
/// than failing; corpus loading never extends the vocabulary.
pub trait Vocabulary {
    /// Map a token to its id, or to `unk_id()` if unknown.
    fn index(&self, token: &str) -> u32;

    fn pad_id(&self) -> u32 {
        PAD_ID
    }

    fn eos_id(&self) -> u32 {
        EOS_ID
    }

    fn unk_id(&self) -> u32 {
        UNK_ID
    }
}

/// Minimal in-memory vocabulary with the reserved ids pre-registered.
#[derive(Debug, Clone)]
pub struct Dictionary {
    indices: HashMap<String, u32>,
}

impl Dictionary {
    /// Create a dictionary containing only the reserved tokens.
    #[must_use]
    pub fn new() -> Self {
        let mut indices = HashMap::new();
        indices.insert("<pad>".to_string(), PAD_ID);
        indices.insert("</s>".to_string(), EOS_ID);
        indices.insert("<unk>".to_string(), UNK_ID);
        Self { indices }
    }

    /// Register a token, returning its id. Re-inserting returns the existing id.
    pub fn insert(&mut self, token: &str) -> u32 {
        let next = self.indices.len() as u32;
        *self.indices.entry(token.to_string()).or_insert(next)
    }

    /// Number of known tokens, reserved ids included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocabulary for Dictionary {
    fn index(&self, token: &str) -> u32 {
        self.indices.get(token).copied().unwrap_or(UNK_ID)
    }
}
