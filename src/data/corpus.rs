// ============================================================
// Layer 4 — Parallel Corpus Sources
// ============================================================
// Two on-disk formats, one sentence pair per line:
//
//   jsonl — already tokenized:
//             {"src": [2, 45, 17, 3], "tgt": [2, 88, 3]}
//
//   tsv   — raw text, encoded with the tokenizer:
//             Guten Morgen.<TAB>Good morning.
//
// Blank lines are ignored. Lines that fail to parse are logged
// with their line number and skipped; a corpus where no line
// survives is an error. Every pair leaves here wrapped as
// SOS … EOS on both sides.
//
// Reference: serde_json documentation
//            Rust Book §12 (Reading a File)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use crate::data::preprocessor::Preprocessor;
use crate::domain::{
    pair::TranslationPair,
    traits::PairSource,
    vocab::SpecialTokens,
};
use crate::infra::tokenizer_store::TextTokenizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CorpusFormat {
    #[default]
    Jsonl,
    Tsv,
}

fn open(path: &PathBuf) -> Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open corpus '{}'", path.display()))?;
    Ok(BufReader::new(file))
}

fn ensure_non_empty(pairs: Vec<TranslationPair>, origin: &str) -> Result<Vec<TranslationPair>> {
    if pairs.is_empty() {
        anyhow::bail!("No usable sentence pairs in '{origin}'");
    }
    tracing::info!("Loaded {} pairs from '{}'", pairs.len(), origin);
    Ok(pairs)
}

// ─── JSONL ────────────────────────────────────────────────────────────────────

fn has_content(ids: &[u32], specials: &SpecialTokens) -> bool {
    ids.iter().any(|&id| !specials.is_special(id))
}

/// Parse pre-tokenized pairs from any reader.
pub fn parse_jsonl(reader: impl BufRead, specials: &SpecialTokens) -> Result<Vec<TranslationPair>> {
    let mut pairs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Read error at line {}", index + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<TranslationPair>(line) {
            Ok(pair) if !has_content(&pair.src, specials) || !has_content(&pair.tgt, specials) => {
                tracing::warn!("Skipping line {}: a side has no content tokens", index + 1);
            }
            Ok(pair) => pairs.push(pair.wrapped(specials)),
            Err(e) => tracing::warn!("Skipping line {}: {}", index + 1, e),
        }
    }
    Ok(pairs)
}

pub struct JsonlCorpus {
    path:     PathBuf,
    specials: SpecialTokens,
}

impl JsonlCorpus {
    pub fn new(path: impl Into<PathBuf>, specials: SpecialTokens) -> Self {
        Self { path: path.into(), specials }
    }
}

impl PairSource for JsonlCorpus {
    fn load_all(&self) -> Result<Vec<TranslationPair>> {
        let pairs = parse_jsonl(open(&self.path)?, &self.specials)?;
        ensure_non_empty(pairs, &self.path.display().to_string())
    }
}

// ─── TSV ──────────────────────────────────────────────────────────────────────

/// Parse `source<TAB>target` text lines from any reader.
pub fn parse_tsv(
    reader:    impl BufRead,
    tokenizer: &TextTokenizer,
    cleaner:   &Preprocessor,
) -> Result<Vec<TranslationPair>> {
    let mut pairs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Read error at line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let Some((src, tgt)) = line.split_once('\t') else {
            tracing::warn!("Skipping line {}: no tab separator", index + 1);
            continue;
        };
        let (src, tgt) = (cleaner.clean(src), cleaner.clean(tgt));
        if src.is_empty() || tgt.is_empty() {
            tracing::warn!("Skipping line {}: empty side", index + 1);
            continue;
        }
        pairs.push(TranslationPair::new(tokenizer.encode(&src)?, tokenizer.encode(&tgt)?));
    }
    Ok(pairs)
}

pub struct TsvCorpus<'a> {
    path:         PathBuf,
    tokenizer:    &'a TextTokenizer,
    preprocessor: Preprocessor,
}

impl<'a> TsvCorpus<'a> {
    pub fn new(path: impl Into<PathBuf>, tokenizer: &'a TextTokenizer) -> Self {
        Self { path: path.into(), tokenizer, preprocessor: Preprocessor::new() }
    }
}

impl PairSource for TsvCorpus<'_> {
    fn load_all(&self) -> Result<Vec<TranslationPair>> {
        let pairs = parse_tsv(open(&self.path)?, self.tokenizer, &self.preprocessor)?;
        ensure_non_empty(pairs, &self.path.display().to_string())
    }
}

/// Load a corpus in `format`. TSV input needs a tokenizer.
pub fn load_corpus(
    format:    CorpusFormat,
    path:      &str,
    specials:  SpecialTokens,
    tokenizer: Option<&TextTokenizer>,
) -> Result<Vec<TranslationPair>> {
    match (format, tokenizer) {
        (CorpusFormat::Jsonl, _) => JsonlCorpus::new(path, specials).load_all(),
        (CorpusFormat::Tsv, Some(tok)) => TsvCorpus::new(path, tok).load_all(),
        (CorpusFormat::Tsv, None) => {
            anyhow::bail!("TSV corpus '{path}' needs --tokenizer to encode the text")
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_jsonl_wraps_and_skips_bad_lines() {
        let input = "{\"src\": [5, 6], \"tgt\": [2, 7, 3]}\n\nnot json\n{\"src\": [9], \"tgt\": [10]}\n";
        let pairs = parse_jsonl(Cursor::new(input), &SpecialTokens::default()).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], TranslationPair::new(vec![2, 5, 6, 3], vec![2, 7, 3]));
        assert_eq!(pairs[1], TranslationPair::new(vec![2, 9, 3], vec![2, 10, 3]));
    }

    #[test]
    fn test_jsonl_skips_sides_without_content() {
        let input = "{\"src\": [9], \"tgt\": []}\n{\"src\": [2, 3], \"tgt\": [2, 8, 3]}\n{\"src\": [1, 9], \"tgt\": [8]}\n";
        let pairs = parse_jsonl(Cursor::new(input), &SpecialTokens::default()).unwrap();
        assert_eq!(pairs, vec![TranslationPair::new(vec![2, 1, 9, 3], vec![2, 8, 3])]);
    }

    #[test]
    fn test_missing_file_is_error() {
        let corpus = JsonlCorpus::new("/nonexistent/corpus.jsonl", SpecialTokens::default());
        assert!(corpus.load_all().is_err());
    }

    #[test]
    fn test_tsv_without_tokenizer_is_error() {
        assert!(load_corpus(CorpusFormat::Tsv, "x.tsv", SpecialTokens::default(), None).is_err());
    }
}
