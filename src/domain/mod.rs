// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types shared by every other layer:
// vocabularies, special tokens, sentence pairs and the
// traits the application layer is written against.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Special token ids and vocabulary bounds
pub mod vocab;

/// An aligned source/target pair of token ids
pub mod pair;

/// Core abstractions (traits) that other layers implement
pub mod traits;
