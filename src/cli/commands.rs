// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands, `train` and `translate`, with their flags.
// Defaults are the base Transformer configuration.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::{
    train_use_case::TrainConfig,
    translate_use_case::{DecodeStrategy, TranslateOptions},
};
use crate::data::corpus::CorpusFormat;
use crate::infra::checkpoint::WeightsChoice;
use crate::ml::{feed_forward::Activation, trainer::ComputeBackend};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a translation model on a parallel corpus
    Train(TrainArgs),

    /// Translate a sentence with a trained checkpoint
    Translate(TranslateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Parallel corpus for training
    #[arg(long)]
    pub train_file: String,

    /// Separate validation corpus; without it a share of the
    /// training pairs is held out
    #[arg(long)]
    pub val_file: Option<String>,

    /// jsonl: {"src": [ids], "tgt": [ids]} per line, tsv: source<TAB>target text
    #[arg(long, value_enum, default_value_t = CorpusFormat::Jsonl)]
    pub format: CorpusFormat,

    /// tokenizer.json (HuggingFace format). Required for tsv; sets
    /// vocabulary size and special ids
    #[arg(long)]
    pub tokenizer: Option<String>,

    /// Directory for weights, config, tokenizer copy and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = ComputeBackend::Wgpu)]
    pub backend: ComputeBackend,

    /// Source vocabulary size, ignored when --tokenizer is given
    #[arg(long, default_value_t = 12_000)]
    pub src_vocab_size: usize,

    /// Target vocabulary size, ignored when --tokenizer is given
    #[arg(long, default_value_t = 12_000)]
    pub tgt_vocab_size: usize,

    /// Model width; must be divisible by --num-heads
    #[arg(long, default_value_t = 512)]
    pub d_model: usize,

    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    /// Layers in each of the encoder and decoder stacks
    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    /// Inner width of the feed-forward sublayer
    #[arg(long, default_value_t = 2048)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Longest sequence, SOS and EOS included; longer pairs are dropped
    #[arg(long, default_value_t = 128)]
    pub max_seq_len: usize,

    #[arg(long, value_enum, default_value_t = Activation::Relu)]
    pub activation: Activation,

    /// Separate source and target embedding tables
    #[arg(long)]
    pub separate_embeddings: bool,

    /// Untied output projection with its own weights
    #[arg(long)]
    pub untied_output: bool,

    /// LayerNorm before each sublayer instead of after
    #[arg(long)]
    pub pre_norm: bool,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Batches per optimiser update (effective batch = batch_size × N)
    #[arg(long, default_value_t = 2)]
    pub accumulate_steps: usize,

    #[arg(long, default_value_t = 30)]
    pub epochs: usize,

    /// Steps of linear learning-rate warmup
    #[arg(long, default_value_t = 4000)]
    pub warmup_steps: usize,

    /// Multiplier on the Noam learning rate
    #[arg(long, default_value_t = 1.0)]
    pub lr_factor: f64,

    #[arg(long, default_value_t = 0.1)]
    pub label_smoothing: f64,

    /// Gradient norm clip; 0 disables clipping
    #[arg(long, default_value_t = 1.0)]
    pub grad_clip: f64,

    /// Stop the run on a NaN/Inf loss or gradient instead of skipping the step
    #[arg(long)]
    pub abort_on_non_finite: bool,

    /// Epochs without BLEU improvement before stopping; 0 disables
    #[arg(long, default_value_t = 5)]
    pub patience: usize,

    /// Smallest validation BLEU gain that resets patience
    #[arg(long, default_value_t = 0.01)]
    pub min_delta: f64,

    /// Share held out for validation when no --val-file is given
    #[arg(long, default_value_t = 0.1)]
    pub val_fraction: f64,

    /// Validation pairs decoded for BLEU each epoch
    #[arg(long, default_value_t = 200)]
    pub bleu_samples: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Log loss and learning rate every N steps
    #[arg(long, default_value_t = 100)]
    pub log_every: usize,

    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,
}

/// Boundary between Layer 1 and Layer 2: the application layer
/// never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            train_file:            a.train_file,
            val_file:              a.val_file,
            format:                a.format,
            tokenizer:             a.tokenizer,
            checkpoint_dir:        a.checkpoint_dir,
            backend:               a.backend,
            src_vocab_size:        a.src_vocab_size,
            tgt_vocab_size:        a.tgt_vocab_size,
            d_model:               a.d_model,
            num_heads:             a.num_heads,
            num_layers:            a.num_layers,
            d_ff:                  a.d_ff,
            dropout:               a.dropout,
            max_seq_len:           a.max_seq_len,
            activation:            a.activation,
            share_embeddings:      !a.separate_embeddings,
            tie_output_projection: !a.untied_output,
            norm_first:            a.pre_norm,
            batch_size:            a.batch_size,
            accumulate_steps:      a.accumulate_steps,
            epochs:                a.epochs,
            warmup_steps:          a.warmup_steps,
            lr_factor:             a.lr_factor,
            label_smoothing:       a.label_smoothing,
            grad_clip:             a.grad_clip,
            abort_on_non_finite:   a.abort_on_non_finite,
            patience:              a.patience,
            min_delta:             a.min_delta,
            val_fraction:          a.val_fraction,
            bleu_samples:          a.bleu_samples,
            seed:                  a.seed,
            log_every:             a.log_every,
            num_workers:           a.num_workers,
            ..TrainConfig::default()
        }
    }
}

/// All arguments for the `translate` command
#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Sentence to translate. With --ids, whitespace-separated token ids
    #[arg(long)]
    pub text: String,

    /// Treat --text as token ids and print ids back
    #[arg(long)]
    pub ids: bool,

    /// Directory written by `train`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = DecodeStrategy::Greedy)]
    pub strategy: DecodeStrategy,

    #[arg(long, default_value_t = 4)]
    pub beam_width: usize,

    /// Output length bound, SOS included
    #[arg(long, default_value_t = 60)]
    pub max_len: usize,

    /// Beam length-penalty exponent
    #[arg(long, default_value_t = 0.6)]
    pub length_alpha: f64,

    /// Use the last epoch instead of the best one
    #[arg(long)]
    pub latest: bool,

    #[arg(long, value_enum, default_value_t = ComputeBackend::Cpu)]
    pub backend: ComputeBackend,
}

impl TranslateArgs {
    pub fn options(&self) -> TranslateOptions {
        TranslateOptions {
            strategy:     self.strategy,
            beam_width:   self.beam_width,
            max_len:      self.max_len,
            length_alpha: self.length_alpha,
            weights:      if self.latest { WeightsChoice::Latest } else { WeightsChoice::Best },
        }
    }

    /// Parse `--text` as token ids.
    pub fn parse_ids(&self) -> anyhow::Result<Vec<u32>> {
        self.text
            .split_whitespace()
            .map(|t| t.parse::<u32>().map_err(|e| anyhow::anyhow!("Bad token id '{t}': {e}")))
            .collect()
    }
}
