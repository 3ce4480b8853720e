// ============================================================
// Layer 3 — TranslationPair Domain Type
// ============================================================
// One aligned sentence pair as token ids. Both sides are
// stored wrapped as SOS … EOS so the target can be shifted
// for teacher forcing:
//
//   decoder input  = tgt[..len-1]   (starts with SOS)
//   decoder labels = tgt[1..]       (ends with EOS)

use serde::{Deserialize, Serialize};

use crate::domain::vocab::{SpecialTokens, Vocabulary};
use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationPair {
    pub src: Vec<u32>,
    pub tgt: Vec<u32>,
}

impl TranslationPair {
    pub fn new(src: Vec<u32>, tgt: Vec<u32>) -> Self {
        Self { src, tgt }
    }

    /// Same pair with both sides wrapped in SOS … EOS.
    pub fn wrapped(self, specials: &SpecialTokens) -> Self {
        Self {
            src: specials.wrap(&self.src),
            tgt: specials.wrap(&self.tgt),
        }
    }

    /// Both sides fit into `max_len` positions.
    pub fn fits(&self, max_len: usize) -> bool {
        self.src.len() <= max_len && self.tgt.len() <= max_len
    }

    pub fn check(&self, src_vocab: &Vocabulary, tgt_vocab: &Vocabulary) -> Result<(), ModelError> {
        src_vocab.check(&self.src)?;
        tgt_vocab.check(&self.tgt)
    }
}
