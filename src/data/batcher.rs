// ============================================================
// Layer 4 — Translation Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<TranslationPair>
// into two Int tensors:
//
//   src: [batch, longest_src]
//   tgt: [batch, longest_tgt]
//
// Sequences have different lengths, so each side is padded on
// the right with pad_id up to the longest sequence of THIS
// batch (not a global maximum). The model rebuilds its masks
// from the pad ids, so no separate mask tensor is carried.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::domain::pair::TranslationPair;

/// Right-pad `seqs` with `pad_id` into a `[seqs.len(), longest]` tensor.
pub fn pad_sequences<B: Backend>(seqs: &[&[u32]], pad_id: u32, device: &B::Device) -> Tensor<B, 2, Int> {
    let width = seqs.iter().map(|s| s.len()).max().unwrap_or(0).max(1);
    let mut flat: Vec<i64> = Vec::with_capacity(seqs.len() * width);
    for seq in seqs {
        flat.extend(seq.iter().map(|&id| id as i64));
        flat.extend(std::iter::repeat(pad_id as i64).take(width - seq.len()));
    }
    Tensor::from_data(TensorData::new(flat, [seqs.len(), width]), device)
}

// ─── TranslationBatch ─────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TranslationBatch<B: Backend> {
    /// Source ids, shape: [batch_size, src_len]
    pub src: Tensor<B, 2, Int>,

    /// Target ids including SOS and EOS, shape: [batch_size, tgt_len]
    pub tgt: Tensor<B, 2, Int>,
}

// ─── TranslationBatcher ───────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct TranslationBatcher<B: Backend> {
    pub device: B::Device,
    pub pad_id: u32,
}

impl<B: Backend> TranslationBatcher<B> {
    pub fn new(device: B::Device, pad_id: u32) -> Self {
        Self { device, pad_id }
    }
}

impl<B: Backend> Batcher<TranslationPair, TranslationBatch<B>> for TranslationBatcher<B> {
    fn batch(&self, items: Vec<TranslationPair>) -> TranslationBatch<B> {
        let src: Vec<&[u32]> = items.iter().map(|p| p.src.as_slice()).collect();
        let tgt: Vec<&[u32]> = items.iter().map(|p| p.tgt.as_slice()).collect();
        TranslationBatch {
            src: pad_sequences(&src, self.pad_id, &self.device),
            tgt: pad_sequences(&tgt, self.pad_id, &self.device),
        }
    }
}
