// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor math, no printing.
// The CLI (Layer 1) builds a config and hands it over; the
// use cases call into data, ml and infra in order.

// Corpus → datasets → training loop → checkpoints
pub mod train_use_case;

// Checkpoint → model → decoded sentence
pub mod translate_use_case;
