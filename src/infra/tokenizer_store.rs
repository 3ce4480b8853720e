// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads a pretrained HuggingFace `tokenizer.json` and adapts it
// to the model's id conventions. Training a tokenizer is not
// done here; bring one built with the four special tokens
//
//   [PAD]  [UNK]  [SOS]  [EOS]
//
// Their ids are looked up by name, so the model follows
// whatever order the tokenizer assigned.
//
// Encoded sentences always read SOS … EOS, whether or not the
// tokenizer has a post-processor that adds them.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use crate::domain::vocab::{SpecialTokens, Vocabulary};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const SOS_TOKEN: &str = "[SOS]";
pub const EOS_TOKEN: &str = "[EOS]";

pub struct TokenizerStore {
    path: PathBuf,
}

impl TokenizerStore {
    /// Store rooted at `dir/tokenizer.json`.
    pub fn new(dir: impl Into<String>) -> Self {
        Self { path: PathBuf::from(dir.into()).join("tokenizer.json") }
    }

    /// Store for an explicit file path.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<TextTokenizer> {
        let inner = Tokenizer::from_file(&self.path).map_err(|e| {
            anyhow::anyhow!("Cannot load tokenizer from '{}': {}", self.path.display(), e)
        })?;
        TextTokenizer::from_tokenizer(inner)
            .with_context(|| format!("Unusable tokenizer '{}'", self.path.display()))
    }
}

/// A tokenizer together with the special ids the model needs.
pub struct TextTokenizer {
    inner:    Tokenizer,
    specials: SpecialTokens,
}

impl TextTokenizer {
    pub fn from_tokenizer(inner: Tokenizer) -> Result<Self> {
        let id = |token: &str| {
            inner
                .token_to_id(token)
                .ok_or_else(|| anyhow::anyhow!("tokenizer has no '{token}' token"))
        };
        let specials = SpecialTokens {
            pad: id(PAD_TOKEN)?,
            unk: id(UNK_TOKEN)?,
            sos: id(SOS_TOKEN)?,
            eos: id(EOS_TOKEN)?,
        };
        tracing::debug!("Special token ids: {:?}", specials);
        Ok(Self { inner, specials })
    }

    pub fn specials(&self) -> SpecialTokens {
        self.specials
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    pub fn vocabulary(&self) -> Vocabulary {
        Vocabulary::new(self.vocab_size(), self.specials)
    }

    /// Text → `SOS … EOS` ids.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Cannot encode '{text}': {e}"))?;
        Ok(self.specials.wrap(encoding.get_ids()))
    }

    /// Ids → text. Stops at the first EOS and drops special tokens.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let content = self.specials.content(ids);
        self.inner
            .decode(&content, true)
            .map_err(|e| anyhow::anyhow!("Cannot decode {} ids: {e}", content.len()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn added(id: u32, content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id, "content": content, "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true
        })
    }

    /// Writes a small word-level tokenizer and returns its path.
    fn write_fixture(tag: &str) -> PathBuf {
        let json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                added(0, PAD_TOKEN), added(1, UNK_TOKEN), added(2, SOS_TOKEN), added(3, EOS_TOKEN)
            ],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {
                    "[PAD]": 0, "[UNK]": 1, "[SOS]": 2, "[EOS]": 3,
                    "hello": 4, "world": 5, "hallo": 6, "welt": 7
                },
                "unk_token": "[UNK]"
            }
        });
        let path = std::env::temp_dir().join(format!("mt_tok_{tag}_{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_specials_and_vocab() {
        let path = write_fixture("specials");
        let tok  = TokenizerStore::from_file(&path).load().unwrap();
        assert_eq!(tok.specials(), SpecialTokens::default());
        assert_eq!(tok.vocab_size(), 8);
        assert_eq!(tok.vocabulary(), Vocabulary::new(8, SpecialTokens::default()));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_encode_wraps_and_decode_strips() {
        let path = write_fixture("roundtrip");
        let tok  = TokenizerStore::from_file(&path).load().unwrap();
        let ids  = tok.encode("hello unknown world").unwrap();
        assert_eq!(ids, vec![2, 4, 1, 5, 3]);
        assert_eq!(tok.decode(&[6, 7, 3, 4]).unwrap(), "hallo welt");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(TokenizerStore::new("/nonexistent/dir").load().is_err());
    }
}
