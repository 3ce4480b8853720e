// ============================================================
// Layer 4 — Translation Dataset
// ============================================================
// In-memory Burn Dataset over sentence pairs. Pairs longer than
// the positional table are dropped at construction, the same
// filter the data loader of a sequence model normally applies.

use burn::data::dataset::Dataset;

use crate::domain::pair::TranslationPair;

pub struct TranslationDataset {
    pairs: Vec<TranslationPair>,
}

impl TranslationDataset {
    pub fn new(pairs: Vec<TranslationPair>) -> Self {
        Self { pairs }
    }

    /// Keep only pairs whose both sides fit `max_len`.
    pub fn filtered(pairs: Vec<TranslationPair>, max_len: usize) -> Self {
        let before = pairs.len();
        let pairs: Vec<TranslationPair> = pairs.into_iter().filter(|p| p.fits(max_len)).collect();
        if pairs.len() < before {
            tracing::info!(
                "Dropped {} of {} pairs longer than {} tokens",
                before - pairs.len(), before, max_len
            );
        }
        Self { pairs }
    }

    pub fn pairs(&self) -> &[TranslationPair] {
        &self.pairs
    }
}

impl Dataset<TranslationPair> for TranslationDataset {
    fn get(&self, index: usize) -> Option<TranslationPair> {
        self.pairs.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }
}
