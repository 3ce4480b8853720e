// ============================================================
// Layer 5 — Autoregressive Decoding
// ============================================================
// The source is encoded once. The target starts as [SOS] and
// grows one token per step; each step re-runs the decoder over
// the whole prefix with a fresh causal mask and reads the
// distribution at the last position.
//
// Two strategies:
//   greedy — take the argmax every step
//   beam   — keep the `beam_width` best prefixes by summed
//            log-probability; finished hypotheses are ranked
//            with the GNMT length penalty ((5 + len) / 6)^α
//
// Both stop on EOS or when the prefix reaches `max_len`
// positions (SOS included). Hitting the bound is a normal
// outcome reported as Termination::MaxLength.
//
// Reference: Wu et al. (2016) Google's NMT System §7

use burn::{
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::data::batcher::pad_sequences;
use crate::domain::vocab::{SpecialTokens, Vocabulary};
use crate::error::{ModelError, Result as ModelResult};
use crate::ml::{
    mask::{decoder_mask, padding_mask},
    model::Transformer,
};

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model emitted EOS.
    EndOfSequence,
    /// The length bound was reached first.
    MaxLength,
}

/// A decoded target sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Generated ids without the leading SOS. Ends with EOS iff
    /// `termination` is `EndOfSequence`.
    pub tokens:      Vec<u32>,
    pub termination: Termination,
    /// Summed log-probability (greedy) or length-normalised score (beam).
    pub score:       f64,
}

impl Translation {
    pub fn is_truncated(&self) -> bool {
        self.termination == Termination::MaxLength
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Clamp the requested bound to the positional table and reject bounds
/// that leave no room for a generated token.
fn effective_max_len<B: Backend>(model: &Transformer<B>, max_len: usize) -> ModelResult<usize> {
    if max_len < 2 {
        return Err(ModelError::InvalidConfig(format!(
            "max_len must leave room for SOS and one token, got {max_len}"
        )));
    }
    Ok(max_len.min(model.max_seq_len))
}

fn check_source<B: Backend>(model: &Transformer<B>, src: &[u32], specials: &SpecialTokens) -> ModelResult<()> {
    if src.is_empty() {
        return Err(ModelError::EmptyBatch);
    }
    Vocabulary::new(model.src_vocab_size(), *specials).check(src)?;
    if (specials.sos as usize) >= model.tgt_vocab_size() {
        return Err(ModelError::TokenOutOfRange {
            id:         specials.sos,
            vocab_size: model.tgt_vocab_size(),
        });
    }
    Ok(())
}

/// Log-probabilities at the last position, one host row per sequence.
fn last_step_log_probs<B: Backend>(
    model:    &Transformer<B>,
    prefixes: Tensor<B, 2, Int>,
    memory:   Tensor<B, 3>,
    src_mask: Tensor<B, 4, Bool>,
) -> ModelResult<Vec<Vec<f32>>> {
    let [rows, len] = prefixes.dims();
    let tgt_mask = decoder_mask(prefixes.clone(), model.pad_id);
    let hidden   = model.decode(prefixes, memory, src_mask, tgt_mask)?;
    let logits   = model.project(hidden)?;
    let vocab    = logits.dims()[2];
    let last     = logits.slice([0..rows, len - 1..len, 0..vocab]).reshape([rows, vocab]);
    let flat: Vec<f32> = log_softmax(last, 1).into_data().convert::<f32>().to_vec()?;
    Ok(flat.chunks(vocab).map(|row| row.to_vec()).collect())
}

/// Index and value of the first maximum.
fn argmax(row: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, &v) in row.iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

// ── Greedy ────────────────────────────────────────────────────────────────────

/// Greedy decoding of a single source sentence.
pub fn greedy_decode<B: Backend>(
    model:    &Transformer<B>,
    src:      &[u32],
    specials: &SpecialTokens,
    max_len:  usize,
    device:   &B::Device,
) -> ModelResult<Translation> {
    greedy_decode_batch(model, &[src], specials, max_len, device)?
        .pop()
        .ok_or(ModelError::EmptyBatch)
}

/// Greedy decoding of several sentences at once. Rows that finish early are
/// fed PAD until every row has emitted EOS or the bound is hit.
pub fn greedy_decode_batch<B: Backend>(
    model:    &Transformer<B>,
    sources:  &[&[u32]],
    specials: &SpecialTokens,
    max_len:  usize,
    device:   &B::Device,
) -> ModelResult<Vec<Translation>> {
    if sources.is_empty() {
        return Err(ModelError::EmptyBatch);
    }
    for src in sources {
        check_source(model, src, specials)?;
    }
    let max_len = effective_max_len(model, max_len)?;

    let src      = pad_sequences::<B>(sources, specials.pad, device);
    let src_mask = padding_mask(src.clone(), model.pad_id);
    let memory   = model.encode(src, src_mask.clone())?;

    let rows = sources.len();
    let mut prefixes: Vec<Vec<u32>> = vec![vec![specials.sos]; rows];
    let mut scores   = vec![0.0f64; rows];
    let mut finished = vec![false; rows];

    while prefixes[0].len() < max_len && finished.iter().any(|done| !done) {
        let views: Vec<&[u32]> = prefixes.iter().map(|p| p.as_slice()).collect();
        let input = pad_sequences::<B>(&views, specials.pad, device);
        let steps = last_step_log_probs(model, input, memory.clone(), src_mask.clone())?;

        for (row, log_probs) in steps.iter().enumerate() {
            if finished[row] {
                prefixes[row].push(specials.pad);
                continue;
            }
            let (token, log_prob) = argmax(log_probs);
            scores[row] += log_prob as f64;
            prefixes[row].push(token as u32);
            if token as u32 == specials.eos {
                finished[row] = true;
            }
        }
    }

    Ok(prefixes
        .into_iter()
        .zip(scores)
        .zip(finished)
        .map(|((prefix, score), done)| {
            let mut tokens: Vec<u32> = prefix[1..].to_vec();
            if done {
                let end = tokens.iter().position(|&t| t == specials.eos).map_or(tokens.len(), |i| i + 1);
                tokens.truncate(end);
            }
            Translation {
                tokens,
                termination: if done { Termination::EndOfSequence } else { Termination::MaxLength },
                score,
            }
        })
        .collect())
}

// ── Beam search ───────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct BeamConfig {
    #[config(default = 4)]
    pub beam_width:   usize,
    /// Bound on the target length, SOS included.
    #[config(default = 60)]
    pub max_len:      usize,
    /// Length penalty exponent α; 0 disables normalisation.
    #[config(default = 0.6)]
    pub length_alpha: f64,
}

#[derive(Debug, Clone)]
struct Hypothesis {
    /// Includes the leading SOS.
    tokens:   Vec<u32>,
    log_prob: f64,
}

impl Hypothesis {
    fn normalized_score(&self, alpha: f64) -> f64 {
        let generated = (self.tokens.len() - 1) as f64;
        self.log_prob / ((5.0 + generated) / 6.0).powf(alpha)
    }

    fn into_translation(self, termination: Termination, alpha: f64) -> Translation {
        let score = self.normalized_score(alpha);
        Translation { tokens: self.tokens[1..].to_vec(), termination, score }
    }
}

/// Beam search over a single source sentence.
pub fn beam_decode<B: Backend>(
    model:    &Transformer<B>,
    src:      &[u32],
    specials: &SpecialTokens,
    config:   &BeamConfig,
    device:   &B::Device,
) -> ModelResult<Translation> {
    if config.beam_width == 0 {
        return Err(ModelError::InvalidConfig("beam_width must be at least 1".into()));
    }
    check_source(model, src, specials)?;
    let max_len = effective_max_len(model, config.max_len)?;
    let width   = config.beam_width;

    let src_ids  = pad_sequences::<B>(&[src], specials.pad, device);
    let src_mask = padding_mask(src_ids.clone(), model.pad_id);
    let memory   = model.encode(src_ids, src_mask.clone())?;
    let [_, src_len, d_model] = memory.dims();

    let mut alive    = vec![Hypothesis { tokens: vec![specials.sos], log_prob: 0.0 }];
    let mut finished: Vec<Hypothesis> = Vec::new();

    while !alive.is_empty() && alive[0].tokens.len() < max_len && finished.len() < width {
        let k = alive.len();
        let views: Vec<&[u32]> = alive.iter().map(|h| h.tokens.as_slice()).collect();
        let input = pad_sequences::<B>(&views, specials.pad, device);
        let steps = last_step_log_probs(
            model,
            input,
            memory.clone().expand([k, src_len, d_model]),
            src_mask.clone().expand([k, 1, 1, src_len]),
        )?;

        // ── Top `width` extensions of every live hypothesis ───────────────────
        let mut candidates: Vec<(f64, usize, u32)> = Vec::with_capacity(k * width);
        for (beam, log_probs) in steps.iter().enumerate() {
            let mut order: Vec<usize> = (0..log_probs.len()).collect();
            order.sort_by(|&a, &b| log_probs[b].total_cmp(&log_probs[a]));
            for &token in order.iter().take(width) {
                candidates.push((alive[beam].log_prob + log_probs[token] as f64, beam, token as u32));
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        // ── Split into finished and next live set ─────────────────────────────
        let mut next = Vec::with_capacity(width);
        for (log_prob, beam, token) in candidates {
            if next.len() == width || finished.len() >= width {
                break;
            }
            let mut tokens = alive[beam].tokens.clone();
            tokens.push(token);
            let hyp = Hypothesis { tokens, log_prob };
            if token == specials.eos {
                finished.push(hyp);
            } else {
                next.push(hyp);
            }
        }
        alive = next;
    }

    let alpha = config.length_alpha;
    let best  = |pool: Vec<Hypothesis>| {
        pool.into_iter()
            .max_by(|a, b| a.normalized_score(alpha).total_cmp(&b.normalized_score(alpha)))
    };
    if let Some(hyp) = best(finished) {
        return Ok(hyp.into_translation(Termination::EndOfSequence, alpha));
    }
    best(alive)
        .map(|hyp| hyp.into_translation(Termination::MaxLength, alpha))
        .ok_or(ModelError::EmptyBatch)
}
