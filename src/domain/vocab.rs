// ============================================================
// Layer 3 — Vocabulary and Special Tokens
// ============================================================
// The model never sees text, only integer ids in
// [0, vocab_size). Four ids carry structural meaning:
//
//   [PAD] — right-padding inside a batch, masked everywhere
//   [UNK] — out-of-vocabulary words
//   [SOS] — first token of every decoder input
//   [EOS] — end of a sentence, stops decoding
//
// The default ids match the order the tokenizer registers
// them in: [PAD]=0, [UNK]=1, [SOS]=2, [EOS]=3.
//
// Reference: Rust Book §5 (Structs)

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Ids of the structural tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    pub pad: u32,
    pub unk: u32,
    pub sos: u32,
    pub eos: u32,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self { pad: 0, unk: 1, sos: 2, eos: 3 }
    }
}

impl SpecialTokens {
    pub fn is_special(&self, id: u32) -> bool {
        id == self.pad || id == self.unk || id == self.sos || id == self.eos
    }

    /// Ensure a sequence reads `SOS … EOS`, adding whichever end is missing.
    pub fn wrap(&self, ids: &[u32]) -> Vec<u32> {
        let mut out = Vec::with_capacity(ids.len() + 2);
        if ids.first() != Some(&self.sos) {
            out.push(self.sos);
        }
        out.extend_from_slice(ids);
        if ids.last() != Some(&self.eos) {
            out.push(self.eos);
        }
        out
    }

    /// The content tokens of a generated sequence: everything up to the
    /// first EOS, without SOS or PAD.
    pub fn content(&self, ids: &[u32]) -> Vec<u32> {
        ids.iter()
            .copied()
            .take_while(|&id| id != self.eos)
            .filter(|&id| id != self.sos && id != self.pad)
            .collect()
    }
}

/// Size of a vocabulary plus its special ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub size:     usize,
    pub specials: SpecialTokens,
}

impl Vocabulary {
    pub fn new(size: usize, specials: SpecialTokens) -> Self {
        Self { size, specials }
    }

    /// Every id must be below `size`.
    pub fn check(&self, ids: &[u32]) -> Result<(), ModelError> {
        match ids.iter().find(|&&id| id as usize >= self.size) {
            Some(&id) => Err(ModelError::TokenOutOfRange { id, vocab_size: self.size }),
            None => Ok(()),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_adds_missing_ends() {
        let s = SpecialTokens::default();
        assert_eq!(s.wrap(&[7, 8]), vec![2, 7, 8, 3]);
        assert_eq!(s.wrap(&[2, 7, 8, 3]), vec![2, 7, 8, 3]);
        assert_eq!(s.wrap(&[2, 7]), vec![2, 7, 3]);
        assert_eq!(s.wrap(&[]), vec![2, 3]);
        assert_eq!(s.wrap(&[2]), vec![2, 3]);
    }

    #[test]
    fn test_content_stops_at_eos() {
        let s = SpecialTokens::default();
        assert_eq!(s.content(&[2, 9, 10, 3, 11, 0]), vec![9, 10]);
        assert_eq!(s.content(&[9, 0, 10]), vec![9, 10]);
    }

    #[test]
    fn test_vocabulary_check() {
        let v = Vocabulary::new(10, SpecialTokens::default());
        assert!(v.check(&[0, 9]).is_ok());
        assert_eq!(
            v.check(&[4, 10, 11]),
            Err(ModelError::TokenOutOfRange { id: 10, vocab_size: 10 })
        );
    }
}
