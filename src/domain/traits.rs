// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer is written against these traits, so a
// corpus can come from JSONL, TSV or anything else, and the
// CLI does not care whether decoding is greedy or beam search.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::pair::TranslationPair;

// ─── PairSource ───────────────────────────────────────────────────────────────
/// Any component that yields aligned sentence pairs.
///
/// Implementations:
///   - JsonlCorpus → pre-tokenized `{"src": [..], "tgt": [..]}` lines
///   - TsvCorpus   → `source<TAB>target` text, encoded by a tokenizer
pub trait PairSource {
    fn load_all(&self) -> Result<Vec<TranslationPair>>;
}

// ─── Translator ───────────────────────────────────────────────────────────────
/// Any component that turns a source sentence into a target sentence.
pub trait Translator {
    fn translate(&self, text: &str) -> Result<String>;
}
