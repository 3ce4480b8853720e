// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From files on disk to padded id tensors:
//
//   corpus file (.jsonl / .tsv)
//       │
//       ▼
//   corpus.rs        → parses lines, cleans + encodes text,
//       │              wraps both sides as SOS … EOS
//       ▼
//   splitter.rs      → seeded train / validation split
//       │
//       ▼
//   dataset.rs       → Burn Dataset, drops over-long pairs
//       │
//       ▼
//   batcher.rs       → right-pads each batch with PAD
//       │
//       ▼
//   DataLoader       → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// JSONL and TSV parallel corpora
pub mod corpus;

/// Normalises raw sentences before tokenisation
pub mod preprocessor;

/// Implements Burn's Dataset trait for sentence pairs
pub mod dataset;

/// Implements Burn's Batcher trait with per-batch padding
pub mod batcher;

/// Shuffles and splits pairs into train/validation sets
pub mod splitter;
