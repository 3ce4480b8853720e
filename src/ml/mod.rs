// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The Transformer itself and everything that runs it.
//
// Building blocks, bottom-up:
//
//   positional.rs   — fixed sinusoidal position table, added to
//                     scaled embeddings, then dropout
//   embedding.rs    — token embedding scaled by √d_model
//   mask.rs         — padding, causal and combined decoder masks
//   attention.rs    — scaled dot-product, multi-head
//   feed_forward.rs — position-wise two-layer network
//   encoder.rs      — self-attention + FFN layers, N deep
//   decoder.rs      — masked self-attention + cross-attention
//                     + FFN layers, N deep
//   projection.rs   — hidden state → vocabulary logits, tied or not
//   model.rs        — assembles the above into encode / decode /
//                     forward
//
// Running it:
//
//   loss.rs         — label-smoothed cross-entropy, PAD ignored
//   schedule.rs     — Noam warmup / inverse-sqrt learning rate
//   decoding.rs     — greedy and beam search
//   trainer.rs      — training step, epoch loop, validation
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

pub mod positional;
pub mod embedding;
pub mod mask;
pub mod attention;
pub mod feed_forward;
pub mod encoder;
pub mod decoder;
pub mod projection;

/// Encoder-decoder model assembled from the blocks above
pub mod model;

pub mod loss;
pub mod schedule;

/// Greedy and beam-search decoding
pub mod decoding;

/// Training step and full loop with validation and checkpointing
pub mod trainer;
