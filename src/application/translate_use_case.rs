// ============================================================
// Layer 2 — Translate Use Case
// ============================================================
// Rebuilds a trained model from its checkpoint directory and
// translates single sentences:
//   1. Read train_config.json to rebuild the architecture
//   2. Restore the best (or latest) weights
//   3. Load the tokenizer copied there during training, if any
//   4. Decode greedily or with beam search
//
// Inference runs on a plain backend, no autodiff, so dropout
// is inactive.

use anyhow::{Context, Result};
use burn::prelude::*;

use crate::domain::{traits::Translator, vocab::SpecialTokens};
use crate::infra::{
    checkpoint::{CheckpointManager, WeightsChoice},
    tokenizer_store::{TextTokenizer, TokenizerStore},
};
use crate::ml::{
    decoding::{beam_decode, greedy_decode, BeamConfig, Translation},
    model::Transformer,
};

/// How the target sentence is searched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DecodeStrategy {
    #[default]
    Greedy,
    Beam,
}

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub strategy:     DecodeStrategy,
    pub beam_width:   usize,
    /// Bound on the output length, SOS included.
    pub max_len:      usize,
    pub length_alpha: f64,
    pub weights:      WeightsChoice,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            strategy:     DecodeStrategy::Greedy,
            beam_width:   4,
            max_len:      60,
            length_alpha: 0.6,
            weights:      WeightsChoice::Best,
        }
    }
}

pub struct TranslateUseCase<B: Backend> {
    model:     Transformer<B>,
    tokenizer: Option<TextTokenizer>,
    specials:  SpecialTokens,
    options:   TranslateOptions,
    device:    B::Device,
}

impl<B: Backend> TranslateUseCase<B> {
    pub fn new(checkpoint_dir: &str, options: TranslateOptions, device: B::Device) -> Result<Self> {
        let ckpt = CheckpointManager::new(checkpoint_dir)?;
        let cfg  = ckpt.load_config()?;

        let model: Transformer<B> = cfg
            .model_config()
            .init(&device)
            .with_context(|| format!("Saved config in '{checkpoint_dir}' is not a valid model"))?;
        let model = ckpt.load_model(model, options.weights, &device)?;

        let store     = TokenizerStore::new(checkpoint_dir);
        let tokenizer = if store.path().exists() {
            Some(store.load()?)
        } else {
            tracing::info!("No tokenizer in '{}', only id input is available", checkpoint_dir);
            None
        };

        Ok(Self::from_parts(model, tokenizer, cfg.specials, options, device))
    }

    pub fn from_parts(
        model:     Transformer<B>,
        tokenizer: Option<TextTokenizer>,
        specials:  SpecialTokens,
        options:   TranslateOptions,
        device:    B::Device,
    ) -> Self {
        Self { model, tokenizer, specials, options, device }
    }

    pub fn has_tokenizer(&self) -> bool {
        self.tokenizer.is_some()
    }

    /// Translate already tokenized input. SOS/EOS are added when missing.
    pub fn translate_ids(&self, src: &[u32]) -> Result<Translation> {
        let src = self.specials.wrap(src);
        let translation = match self.options.strategy {
            DecodeStrategy::Greedy => {
                greedy_decode(&self.model, &src, &self.specials, self.options.max_len, &self.device)?
            }
            DecodeStrategy::Beam => {
                let beam = BeamConfig::new()
                    .with_beam_width(self.options.beam_width)
                    .with_max_len(self.options.max_len)
                    .with_length_alpha(self.options.length_alpha);
                beam_decode(&self.model, &src, &self.specials, &beam, &self.device)?
            }
        };
        if translation.is_truncated() {
            tracing::warn!(
                "Output hit the length bound ({} tokens) before EOS",
                translation.tokens.len()
            );
        }
        Ok(translation)
    }

    /// Content ids of a translation: no SOS, no PAD, nothing from EOS on.
    pub fn content(&self, translation: &Translation) -> Vec<u32> {
        self.specials.content(&translation.tokens)
    }
}

impl<B: Backend> Translator for TranslateUseCase<B> {
    fn translate(&self, text: &str) -> Result<String> {
        let tokenizer = self
            .tokenizer
            .as_ref()
            .context("This checkpoint has no tokenizer; pass token ids instead")?;
        let src = tokenizer.encode(text)?;
        let translation = self.translate_ids(&src)?;
        tokenizer.decode(&translation.tokens)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny_config() -> TrainConfig {
        TrainConfig {
            src_vocab_size: 12,
            tgt_vocab_size: 12,
            d_model:        8,
            num_heads:      2,
            num_layers:     1,
            d_ff:           16,
            max_seq_len:    10,
            ..TrainConfig::default()
        }
    }

    fn use_case(options: TranslateOptions) -> TranslateUseCase<TestBackend> {
        let device = Default::default();
        let model  = tiny_config().model_config().init::<TestBackend>(&device).unwrap();
        TranslateUseCase::from_parts(model, None, SpecialTokens::default(), options, device)
    }

    #[test]
    fn test_greedy_ids_respect_bound() {
        let uc = use_case(TranslateOptions { max_len: 6, ..TranslateOptions::default() });
        let out = uc.translate_ids(&[5, 6, 7]).unwrap();
        assert!(out.tokens.len() <= 5);
    }

    #[test]
    fn test_beam_ids_respect_bound() {
        let uc = use_case(TranslateOptions {
            strategy: DecodeStrategy::Beam,
            beam_width: 3,
            max_len: 6,
            ..TranslateOptions::default()
        });
        let out = uc.translate_ids(&[2, 5, 6, 3]).unwrap();
        assert!(out.tokens.len() <= 5);
    }

    #[test]
    fn test_text_without_tokenizer_is_error() {
        let uc = use_case(TranslateOptions::default());
        assert!(!uc.has_tokenizer());
        assert!(uc.translate("hello").is_err());
    }

    #[test]
    fn test_rebuilds_from_checkpoint_dir() {
        let dir  = std::env::temp_dir().join(format!("mt_translate_{}", std::process::id()));
        let path = dir.to_string_lossy().to_string();
        let ckpt = CheckpointManager::new(path.clone()).unwrap();
        let cfg  = tiny_config();
        let device = Default::default();
        let model  = cfg.model_config().init::<TestBackend>(&device).unwrap();
        ckpt.save_config(&cfg).unwrap();
        ckpt.save_model(&model, 1).unwrap();

        let uc = TranslateUseCase::<TestBackend>::new(&path, TranslateOptions::default(), device).unwrap();
        assert!(!uc.has_tokenizer());
        assert!(uc.translate_ids(&[4, 5]).is_ok());
        std::fs::remove_dir_all(dir).ok();
    }
}
