// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and Adam.
//
// One step, strictly in this order:
//   1. forward + label-smoothed loss (teacher forcing)
//   2. loss pulled to the host and checked for NaN / Inf
//   3. backward
//   4. every parameter gradient checked for NaN / Inf
//   5. gradients added to the accumulation window
//   6. once per `accumulate_steps` batches: Adam update with the
//      Noam rate for this update count
//
// A failure in 2 or 4 leaves the weights and the window
// untouched. The loop
// either skips such a step (warn) or aborts, depending on
// TrainConfig::abort_on_non_finite.
//
// Key Burn insight:
//   - Training uses Autodiff<Backend> for gradients
//   - model.valid() returns the model on the inner backend,
//     with dropout off, for validation and decoding
//   - optim.step() consumes the model and returns the update
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{TranslationBatch, TranslationBatcher},
    dataset::TranslationDataset,
};
use crate::domain::pair::TranslationPair;
use crate::error::{ModelError, Result as ModelResult};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{corpus_bleu, EpochMetrics, MetricsLogger},
};
use crate::ml::{
    decoding::greedy_decode_batch,
    loss::{LabelSmoothingLoss, LabelSmoothingLossConfig},
    model::Transformer,
    schedule::{NoamSchedule, NoamScheduleConfig},
};

/// Device family to train on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    /// GPU through WGPU
    #[default]
    Wgpu,
    /// CPU through ndarray
    Cpu,
}

type WgpuBackend    = burn::backend::Autodiff<burn::backend::Wgpu>;
type NdArrayBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// What a finished run reports back to the caller.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub epochs_run:    usize,
    pub steps:         usize,
    pub skipped_steps: usize,
    pub best_epoch:    Option<usize>,
    pub best_bleu:     f64,
}

/// Result of one training step. `lr` is set when the step ended with an
/// optimiser update, `None` while gradients are still being accumulated.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    pub loss: f64,
    pub lr:   Option<f64>,
}

pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: TranslationDataset,
    val_dataset:   TranslationDataset,
    ckpt_manager:  &CheckpointManager,
    metrics:       &MetricsLogger,
) -> Result<TrainSummary> {
    match cfg.backend {
        ComputeBackend::Wgpu => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<WgpuBackend>(cfg, train_dataset, val_dataset, ckpt_manager, metrics, device)
        }
        ComputeBackend::Cpu => {
            let device = burn::backend::ndarray::NdArrayDevice::Cpu;
            tracing::info!("Using CPU device");
            train_loop::<NdArrayBackend>(cfg, train_dataset, val_dataset, ckpt_manager, metrics, device)
        }
    }
}

// ── Single step ───────────────────────────────────────────────────────────────

/// Sums gradients over `every` batches before one optimiser update.
/// Each batch loss is scaled by 1/every, so the update sees the mean.
pub struct GradientAccumulation<B: AutodiffBackend> {
    accumulator: GradientsAccumulator<Transformer<B>>,
    every:       usize,
    pending:     usize,
}

impl<B: AutodiffBackend> GradientAccumulation<B> {
    pub fn new(every: usize) -> Self {
        Self { accumulator: GradientsAccumulator::new(), every: every.max(1), pending: 0 }
    }

    pub fn every(&self) -> usize {
        self.every
    }

    /// Batches accumulated since the last update.
    pub fn pending(&self) -> usize {
        self.pending
    }

    fn loss_scale(&self) -> f64 {
        1.0 / self.every as f64
    }

    fn apply<O: Optimizer<Transformer<B>, B>>(&mut self, optim: &mut O, lr: f64, model: Transformer<B>) -> Transformer<B> {
        self.pending = 0;
        optim.step(lr, model, self.accumulator.grads())
    }

    /// Apply what is left at the end of an epoch. Returns the rate used,
    /// or `None` when nothing was pending.
    pub fn flush<O: Optimizer<Transformer<B>, B>>(
        &mut self,
        model:    Transformer<B>,
        optim:    &mut O,
        schedule: &NoamSchedule,
        step:     usize,
    ) -> (Transformer<B>, ModelResult<Option<f64>>) {
        if self.pending == 0 {
            return (model, Ok(None));
        }
        match schedule.rate(step) {
            Ok(lr) => (self.apply(optim, lr, model), Ok(Some(lr))),
            Err(e) => (model, Err(e)),
        }
    }
}

/// Loss value and parameter gradients for one batch, or the reason the
/// batch must not be applied. The reported loss is unscaled; the
/// gradients are those of `loss * scale`.
pub fn compute_gradients<B: AutodiffBackend>(
    model:   &Transformer<B>,
    batch:   TranslationBatch<B>,
    loss_fn: &LabelSmoothingLoss,
    step:    usize,
    scale:   f64,
) -> ModelResult<(f64, GradientsParams)> {
    let loss  = model.forward_loss(batch.src, batch.tgt, loss_fn)?;
    let value = loss.clone().into_scalar().elem::<f64>();
    if !value.is_finite() {
        return Err(ModelError::NonFiniteLoss { step, value });
    }
    let grads = loss.mul_scalar(scale).backward();
    if !model.gradients_are_finite(&grads) {
        return Err(ModelError::NonFiniteGradient { step });
    }
    Ok((value, GradientsParams::from_grads(grads, model)))
}

/// Runs one batch. The model always comes back: updated when this batch
/// completes an accumulation window, unchanged otherwise or on error.
/// A rejected batch adds nothing to the accumulated gradients.
pub fn train_step<B, O>(
    model:        Transformer<B>,
    optim:        &mut O,
    accumulation: &mut GradientAccumulation<B>,
    batch:        TranslationBatch<B>,
    loss_fn:      &LabelSmoothingLoss,
    schedule:     &NoamSchedule,
    step:         usize,
) -> (Transformer<B>, ModelResult<StepOutcome>)
where
    B: AutodiffBackend,
    O: Optimizer<Transformer<B>, B>,
{
    let lr = if accumulation.pending + 1 >= accumulation.every {
        match schedule.rate(step) {
            Ok(lr) => Some(lr),
            Err(e) => return (model, Err(e)),
        }
    } else {
        None
    };
    let (loss, grads) = match compute_gradients(&model, batch, loss_fn, step, accumulation.loss_scale()) {
        Ok(computed) => computed,
        Err(e) => return (model, Err(e)),
    };
    accumulation.accumulator.accumulate(&model, grads);
    accumulation.pending += 1;

    match lr {
        Some(lr) => (accumulation.apply(optim, lr, model), Ok(StepOutcome { loss, lr: Some(lr) })),
        None => (model, Ok(StepOutcome { loss, lr: None })),
    }
}

/// What a failed step means for the run: NaN/Inf steps are skipped
/// unless `abort` is set; any other error ends the run.
pub fn skip_or_abort(err: ModelError, abort: bool) -> ModelResult<()> {
    let non_finite = matches!(err, ModelError::NonFiniteLoss { .. } | ModelError::NonFiniteGradient { .. });
    if non_finite && !abort {
        tracing::warn!("Skipping update: {}", err);
        Ok(())
    } else {
        Err(err)
    }
}

/// Greedy-decode BLEU over `pairs`, decoded `batch_size` sentences at a time.
pub fn evaluate_bleu<B: Backend>(
    model:   &Transformer<B>,
    pairs:   &[TranslationPair],
    cfg:     &TrainConfig,
    device:  &B::Device,
) -> ModelResult<f64> {
    let mut hypotheses = Vec::with_capacity(pairs.len());
    let mut references = Vec::with_capacity(pairs.len());
    for chunk in pairs.chunks(cfg.batch_size.max(1)) {
        let sources: Vec<&[u32]> = chunk.iter().map(|p| p.src.as_slice()).collect();
        let decoded = greedy_decode_batch(model, &sources, &cfg.specials, cfg.max_seq_len, device)?;
        for (translation, pair) in decoded.iter().zip(chunk) {
            hypotheses.push(cfg.specials.content(&translation.tokens));
            references.push(cfg.specials.content(&pair.tgt));
        }
    }
    Ok(corpus_bleu(&hypotheses, &references))
}

// ── Full loop ─────────────────────────────────────────────────────────────────

fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    train_dataset: TranslationDataset,
    val_dataset:   TranslationDataset,
    ckpt_manager:  &CheckpointManager,
    metrics:       &MetricsLogger,
    device:        B::Device,
) -> Result<TrainSummary> {
    B::seed(cfg.seed);

    // ── Build model, loss, schedule ───────────────────────────────────────────
    let mut model: Transformer<B> = cfg.model_config().init(&device)?;
    tracing::info!(
        "Model ready: {} layers, d_model={}, {} parameters",
        cfg.num_layers, cfg.d_model, model.num_params()
    );

    let pad_id   = cfg.specials.pad;
    let loss_fn  = LabelSmoothingLossConfig::new(pad_id as usize)
        .with_smoothing(cfg.label_smoothing)
        .init()?;
    let schedule = NoamScheduleConfig::new(cfg.d_model)
        .with_warmup_steps(cfg.warmup_steps)
        .with_factor(cfg.lr_factor)
        .init()?;
    tracing::info!(
        "Noam schedule peaks at update {} with lr={:.3e}",
        schedule.peak_step(),
        schedule.rate(schedule.peak_step().max(1))?,
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // β = (0.9, 0.98), ε = 1e-9, gradient norm clipped to grad_clip
    let mut optim = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.98)
        .with_epsilon(1e-9)
        .with_grad_clipping((cfg.grad_clip > 0.0).then(|| GradientClippingConfig::Norm(cfg.grad_clip as f32)))
        .init();
    let mut accumulation = GradientAccumulation::<B>::new(cfg.accumulate_steps);
    if accumulation.every() > 1 {
        tracing::info!("Accumulating gradients over {} batches per update", accumulation.every());
    }

    // ── Data loaders ──────────────────────────────────────────────────────────
    let bleu_pairs: Vec<TranslationPair> = val_dataset
        .pairs()
        .iter()
        .take(cfg.bleu_samples)
        .cloned()
        .collect();

    let train_loader = DataLoaderBuilder::new(TranslationBatcher::<B>::new(device.clone(), pad_id))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);
    let val_loader = DataLoaderBuilder::new(TranslationBatcher::<B::InnerBackend>::new(device.clone(), pad_id))
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut applied       = 0usize;
    let mut skipped_total = 0usize;
    let mut best_bleu     = f64::NEG_INFINITY;
    let mut best_epoch    = None;
    let mut stale_epochs  = 0usize;
    let mut epochs_run    = 0usize;

    for epoch in 1..=cfg.epochs {
        epochs_run = epoch;

        // ── Training phase ────────────────────────────────────────────────────
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut skipped  = 0usize;

        for batch in train_loader.iter() {
            let (next, outcome) = train_step(
                model, &mut optim, &mut accumulation, batch, &loss_fn, &schedule, applied + 1,
            );
            model = next;
            match outcome {
                Ok(step) => {
                    loss_sum += step.loss;
                    batches  += 1;
                    if let Some(lr) = step.lr {
                        applied += 1;
                        if cfg.log_every > 0 && applied % cfg.log_every == 0 {
                            tracing::info!("step {} | loss={:.4} | lr={:.3e}", applied, step.loss, lr);
                        }
                    }
                }
                Err(e) => {
                    skip_or_abort(e, cfg.abort_on_non_finite)
                        .with_context(|| format!("Training failed in epoch {epoch}"))?;
                    skipped += 1;
                }
            }
        }
        // A partial window at the end of the epoch still updates.
        let (next, flushed) = accumulation.flush(model, &mut optim, &schedule, applied + 1);
        model = next;
        if flushed?.is_some() {
            applied += 1;
        }
        skipped_total += skipped;
        let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        // model.valid() → Transformer<B::InnerBackend>, dropout disabled
        let model_valid = model.valid();

        let mut val_sum     = 0.0f64;
        let mut val_batches = 0usize;
        for batch in val_loader.iter() {
            let loss = model_valid.forward_loss(batch.src, batch.tgt, &loss_fn)?;
            val_sum     += loss.into_scalar().elem::<f64>();
            val_batches += 1;
        }
        let val_loss = if val_batches > 0 { val_sum / val_batches as f64 } else { f64::NAN };
        let val_bleu = if bleu_pairs.is_empty() {
            0.0
        } else {
            evaluate_bleu(&model_valid, &bleu_pairs, cfg, &device)?
        };

        let row = EpochMetrics { epoch, train_loss, val_loss, val_bleu, skipped_steps: skipped };
        metrics.log(&row)?;
        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_bleu={:.2} | skipped={}",
            epoch, cfg.epochs, train_loss, val_loss, val_bleu, skipped,
        );

        ckpt_manager.save_model(&model, epoch)?;

        // ── Model selection / early stopping ──────────────────────────────────
        if row.is_improvement(best_bleu, cfg.min_delta) {
            best_bleu    = val_bleu;
            best_epoch   = Some(epoch);
            stale_epochs = 0;
            ckpt_manager.save_best(&model, epoch)?;
        } else {
            stale_epochs += 1;
            if cfg.patience > 0 && stale_epochs >= cfg.patience {
                tracing::info!("No BLEU improvement for {} epochs, stopping early", stale_epochs);
                break;
            }
        }
    }

    tracing::info!("Training complete after {} steps", applied);
    Ok(TrainSummary {
        epochs_run,
        steps: applied,
        skipped_steps: skipped_total,
        best_epoch,
        best_bleu: best_bleu.max(0.0),
    })
}
