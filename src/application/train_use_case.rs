// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the model config     (Layer 5 - ml)
//   Step 2: Load tokenizer, if any        (Layer 6 - infra)
//   Step 3: Load parallel corpus          (Layer 4 - data)
//   Step 4: Check ids against vocabulary  (Layer 3 - domain)
//   Step 5: Split train/validation        (Layer 4 - data)
//   Step 6: Build length-filtered datasets(Layer 4 - data)
//   Step 7: Save config                   (Layer 6 - infra)
//   Step 8: Run training loop             (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{
    corpus::{load_corpus, CorpusFormat},
    dataset::TranslationDataset,
    splitter::split_train_val,
};
use crate::domain::{
    pair::TranslationPair,
    vocab::{SpecialTokens, Vocabulary},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    tokenizer_store::{TextTokenizer, TokenizerStore},
};
use crate::ml::{
    feed_forward::Activation,
    model::TransformerConfig,
    trainer::{run_training, ComputeBackend, TrainSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for a training run. Saved next to the checkpoints
// so `translate` can rebuild exactly the same architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    // ── Data ─────────────────────────────────────────────────────────────────
    pub train_file:     String,
    pub val_file:       Option<String>,
    pub format:         CorpusFormat,
    pub tokenizer:      Option<String>,
    pub checkpoint_dir: String,
    pub backend:        ComputeBackend,

    // ── Vocabulary (overridden by the tokenizer when one is given) ───────────
    pub src_vocab_size: usize,
    pub tgt_vocab_size: usize,
    pub specials:       SpecialTokens,

    // ── Architecture ─────────────────────────────────────────────────────────
    pub d_model:               usize,
    pub num_heads:             usize,
    pub num_layers:            usize,
    pub d_ff:                  usize,
    pub dropout:               f64,
    pub max_seq_len:           usize,
    pub activation:            Activation,
    pub share_embeddings:      bool,
    pub tie_output_projection: bool,
    pub norm_first:            bool,

    // ── Optimisation ─────────────────────────────────────────────────────────
    pub batch_size:          usize,
    /// Batches whose gradients are summed into one optimiser update
    pub accumulate_steps:    usize,
    pub epochs:              usize,
    pub warmup_steps:        usize,
    pub lr_factor:           f64,
    pub label_smoothing:     f64,
    pub grad_clip:           f64,
    pub abort_on_non_finite: bool,

    // ── Evaluation / bookkeeping ─────────────────────────────────────────────
    pub patience:     usize,
    /// Smallest BLEU gain that counts as an improvement
    pub min_delta:    f64,
    pub val_fraction: f64,
    pub bleu_samples: usize,
    pub seed:         u64,
    pub log_every:    usize,
    pub num_workers:  usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_file:     "data/train.jsonl".to_string(),
            val_file:       None,
            format:         CorpusFormat::Jsonl,
            tokenizer:      None,
            checkpoint_dir: "checkpoints".to_string(),
            backend:        ComputeBackend::Wgpu,

            src_vocab_size: 12_000,
            tgt_vocab_size: 12_000,
            specials:       SpecialTokens::default(),

            d_model:               512,
            num_heads:             8,
            num_layers:            6,
            d_ff:                  2048,
            dropout:               0.1,
            max_seq_len:           128,
            activation:            Activation::Relu,
            share_embeddings:      true,
            tie_output_projection: true,
            norm_first:            false,

            batch_size:          32,
            accumulate_steps:    2,
            epochs:              30,
            warmup_steps:        4000,
            lr_factor:           1.0,
            label_smoothing:     0.1,
            grad_clip:           1.0,
            abort_on_non_finite: false,

            patience:     5,
            min_delta:    0.01,
            val_fraction: 0.1,
            bleu_samples: 200,
            seed:         42,
            log_every:    100,
            num_workers:  2,
        }
    }
}

impl TrainConfig {
    /// The architecture part of the config, as the model layer wants it.
    pub fn model_config(&self) -> TransformerConfig {
        TransformerConfig::new(self.src_vocab_size, self.tgt_vocab_size)
            .with_d_model(self.d_model)
            .with_num_heads(self.num_heads)
            .with_num_layers(self.num_layers)
            .with_d_ff(self.d_ff)
            .with_dropout(self.dropout)
            .with_max_seq_len(self.max_seq_len)
            .with_activation(self.activation)
            .with_pad_id(self.specials.pad as usize)
            .with_share_embeddings(self.share_embeddings)
            .with_tie_output_projection(self.tie_output_projection)
            .with_norm_first(self.norm_first)
    }

    /// Take vocabulary size and special ids from the tokenizer.
    pub fn adopt_tokenizer(&mut self, tokenizer: &TextTokenizer) {
        let vocab = tokenizer.vocabulary();
        self.src_vocab_size = vocab.size;
        self.tgt_vocab_size = vocab.size;
        self.specials       = vocab.specials;
    }

    /// Fail on the first pair holding an id outside its vocabulary.
    pub fn check_pairs(&self, pairs: &[TranslationPair]) -> Result<()> {
        let src = Vocabulary::new(self.src_vocab_size, self.specials);
        let tgt = Vocabulary::new(self.tgt_vocab_size, self.specials);
        for (index, pair) in pairs.iter().enumerate() {
            pair.check(&src, &tgt)
                .with_context(|| format!("Pair {} does not fit the vocabulary", index + 1))?;
        }
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(mut self) -> Result<TrainSummary> {
        let ckpt_manager = CheckpointManager::new(&self.config.checkpoint_dir)?;

        // ── Step 2: Tokenizer ─────────────────────────────────────────────────
        // The tokenizer decides vocabulary size and special ids, so it is
        // loaded before the config is validated.
        let tokenizer = match &self.config.tokenizer {
            Some(path) => {
                let tokenizer = TokenizerStore::from_file(path).load()?;
                ckpt_manager.store_tokenizer(Path::new(path))?;
                tracing::info!("Tokenizer '{}' with {} entries", path, tokenizer.vocab_size());
                Some(tokenizer)
            }
            None => None,
        };
        if let Some(tok) = &tokenizer {
            self.config.adopt_tokenizer(tok);
        }
        let cfg = &self.config;

        // ── Step 1: Validate architecture before touching data ────────────────
        cfg.model_config().validate()?;

        // ── Step 3: Load corpus ───────────────────────────────────────────────
        tracing::info!("Loading training pairs from '{}'", cfg.train_file);
        let train_pairs = load_corpus(cfg.format, &cfg.train_file, cfg.specials, tokenizer.as_ref())?;

        // ── Step 4: Vocabulary check ──────────────────────────────────────────
        cfg.check_pairs(&train_pairs)?;

        // ── Step 5: Train / validation pairs ──────────────────────────────────
        let (train_pairs, val_pairs) = match &cfg.val_file {
            Some(path) => {
                let val = load_corpus(cfg.format, path, cfg.specials, tokenizer.as_ref())?;
                cfg.check_pairs(&val)?;
                (train_pairs, val)
            }
            None => split_train_val(train_pairs, 1.0 - cfg.val_fraction, cfg.seed),
        };
        tracing::info!("Split: {} train, {} validation", train_pairs.len(), val_pairs.len());

        // ── Step 6: Burn datasets ─────────────────────────────────────────────
        let train_dataset = TranslationDataset::filtered(train_pairs, cfg.max_seq_len);
        let val_dataset   = TranslationDataset::filtered(val_pairs, cfg.max_seq_len);
        if train_dataset.pairs().is_empty() {
            anyhow::bail!("No training pairs fit max_seq_len = {}", cfg.max_seq_len);
        }

        // ── Step 7: Save config for inference ─────────────────────────────────
        ckpt_manager.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 8: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, train_dataset, val_dataset, &ckpt_manager, &metrics)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_base_model() {
        let cfg = TrainConfig::default();
        let model = cfg.model_config();
        assert_eq!(model.d_model, 512);
        assert_eq!(model.num_heads, 8);
        assert_eq!(model.num_layers, 6);
        assert_eq!(model.d_ff, 2048);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: TrainConfig = serde_json::from_str(r#"{"d_model": 64, "backend": "cpu"}"#).unwrap();
        assert_eq!(cfg.d_model, 64);
        assert_eq!(cfg.backend, ComputeBackend::Cpu);
        assert_eq!(cfg.patience, 5);
    }

    #[test]
    fn test_check_pairs_reports_bad_id() {
        let cfg = TrainConfig { src_vocab_size: 10, tgt_vocab_size: 10, ..TrainConfig::default() };
        let ok  = vec![TranslationPair::new(vec![2, 5, 3], vec![2, 9, 3])];
        let bad = vec![TranslationPair::new(vec![2, 5, 3], vec![2, 10, 3])];
        assert!(cfg.check_pairs(&ok).is_ok());
        assert!(cfg.check_pairs(&bad).is_err());
    }

    #[test]
    fn test_end_to_end_on_cpu() {
        let dir   = std::env::temp_dir().join(format!("mt_train_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let train = dir.join("train.jsonl");
        let lines: Vec<String> = (0..8)
            .map(|i| format!("{{\"src\": [{}, {}], \"tgt\": [{}, {}]}}", 4 + i, 5 + i, 5 + i, 4 + i))
            .collect();
        std::fs::write(&train, lines.join("\n")).unwrap();

        let cfg = TrainConfig {
            train_file:     train.to_string_lossy().to_string(),
            checkpoint_dir: dir.join("ckpt").to_string_lossy().to_string(),
            backend:        ComputeBackend::Cpu,
            src_vocab_size: 16,
            tgt_vocab_size: 16,
            d_model:        8,
            num_heads:      2,
            num_layers:     1,
            d_ff:           16,
            max_seq_len:    8,
            batch_size:     4,
            accumulate_steps: 1,
            epochs:         2,
            warmup_steps:   2,
            val_fraction:   0.25,
            bleu_samples:   2,
            num_workers:    1,
            ..TrainConfig::default()
        };
        let summary = TrainUseCase::new(cfg).execute().unwrap();
        assert_eq!(summary.epochs_run, 2);
        assert_eq!(summary.steps + summary.skipped_steps, 4);
        assert!(dir.join("ckpt").join("train_config.json").exists());
        assert!(dir.join("ckpt").join("latest_epoch.json").exists());
        std::fs::remove_dir_all(dir).ok();
    }
}
