// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Disk-facing concerns shared by training and translation:
//
//   checkpoint.rs      — weights per epoch and the best epoch
//                        through Burn's CompactRecorder, plus
//                        TrainConfig as JSON so translation can
//                        rebuild the same architecture
//
//   tokenizer_store.rs — loads a HuggingFace tokenizer.json,
//                        resolves the special-token ids and
//                        turns text into ids and back
//
//   metrics.rs         — corpus BLEU and the per-epoch CSV log
//
// Reference: Burn Book §5 (Checkpointing)
//            Papineni et al. (2002) BLEU

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer loading, encode / decode
pub mod tokenizer_store;

/// BLEU and training metrics CSV logger
pub mod metrics;
