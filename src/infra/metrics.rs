// ============================================================
// Layer 6 — Metrics: Corpus BLEU and Epoch Log
// ============================================================
// BLEU compares generated token ids with reference ids:
//
//   p_n  = clipped n-gram matches / hypothesis n-grams   (n = 1..4,
//          summed over the whole corpus before dividing)
//   BP   = 1                 if c > r
//          exp(1 − r / c)    otherwise
//   BLEU = 100 · BP · exp( Σ_n ¼ · ln p_n )
//
// with c / r the total hypothesis / reference lengths. Any
// p_n = 0 gives 0 (no smoothing).
//
// After every epoch one row is appended to metrics.csv:
//
//   epoch,train_loss,val_loss,val_bleu,skipped_steps
//   1,7.912400,7.101300,0.000000,0
//   2,6.203100,5.887200,3.412000,0
//
// Reference: Papineni et al. (2002) BLEU

use anyhow::Result;
use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

const MAX_ORDER: usize = 4;

fn ngram_counts(tokens: &[u32], n: usize) -> HashMap<&[u32], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

/// Corpus-level BLEU on a 0–100 scale. `hypotheses[i]` is scored
/// against `references[i]`; extra entries on either side are ignored.
pub fn corpus_bleu(hypotheses: &[Vec<u32>], references: &[Vec<u32>]) -> f64 {
    let mut matches = [0usize; MAX_ORDER];
    let mut totals  = [0usize; MAX_ORDER];
    let mut hyp_len = 0usize;
    let mut ref_len = 0usize;

    for (hyp, reference) in hypotheses.iter().zip(references) {
        hyp_len += hyp.len();
        ref_len += reference.len();
        for n in 1..=MAX_ORDER {
            let ref_counts = ngram_counts(reference, n);
            for (gram, count) in ngram_counts(hyp, n) {
                let clip = ref_counts.get(gram).copied().unwrap_or(0);
                matches[n - 1] += count.min(clip);
            }
            totals[n - 1] += hyp.len().saturating_sub(n - 1);
        }
    }

    if hyp_len == 0 || matches.iter().any(|&m| m == 0) {
        return 0.0;
    }
    let log_precision: f64 = matches
        .iter()
        .zip(totals.iter())
        .map(|(&m, &t)| (m as f64 / t as f64).ln())
        .sum::<f64>()
        / MAX_ORDER as f64;
    let brevity = if hyp_len > ref_len {
        1.0
    } else {
        (1.0 - ref_len as f64 / hyp_len as f64).exp()
    };
    100.0 * brevity * log_precision.exp()
}

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:         usize,
    /// Mean label-smoothed loss over applied training steps
    pub train_loss:    f64,
    /// Mean loss over validation batches, dropout off
    pub val_loss:      f64,
    /// Greedy-decode corpus BLEU on the validation sample
    pub val_bleu:      f64,
    /// Steps dropped because of a non-finite loss or gradient
    pub skipped_steps: usize,
}

impl EpochMetrics {
    /// BLEU is the model-selection metric: higher is better. Gains of
    /// `min_delta` or less do not count.
    pub fn is_improvement(&self, best_bleu: f64, min_delta: f64) -> bool {
        self.val_bleu > best_bleu + min_delta
    }
}

/// Appends epoch metrics to `metrics.csv` in the checkpoint directory.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,val_loss,val_bleu,skipped_steps")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{}",
            m.epoch, m.train_loss, m.val_loss, m.val_bleu, m.skipped_steps,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(bleu: f64) -> EpochMetrics {
        EpochMetrics { epoch: 1, train_loss: 2.0, val_loss: 2.1, val_bleu: bleu, skipped_steps: 0 }
    }

    #[test]
    fn test_is_improvement() {
        assert!(metrics(12.5).is_improvement(10.0, 0.0));
        assert!(!metrics(12.5).is_improvement(12.5, 0.0));
        assert!(metrics(0.0).is_improvement(f64::NEG_INFINITY, 0.01));
    }

    #[test]
    fn test_gain_within_min_delta_is_not_improvement() {
        assert!(!metrics(10.005).is_improvement(10.0, 0.01));
        assert!(!metrics(10.01).is_improvement(10.0, 0.01));
        assert!(metrics(10.02).is_improvement(10.0, 0.01));
    }

    #[test]
    fn test_identical_corpus_scores_100() {
        let corpus = vec![vec![4, 5, 6, 7, 8], vec![9, 10, 11, 12]];
        assert!((corpus_bleu(&corpus, &corpus) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        let hyp = vec![vec![4, 5, 6, 7]];
        let reference = vec![vec![8, 9, 10, 11]];
        assert_eq!(corpus_bleu(&hyp, &reference), 0.0);
    }

    #[test]
    fn test_brevity_penalty_applies() {
        // exact prefix: every precision is 1, only BP < 1 remains
        let hyp = vec![vec![4, 5, 6, 7]];
        let reference = vec![vec![4, 5, 6, 7, 8, 9, 10, 11]];
        let expected = 100.0 * (1.0f64 - 8.0 / 4.0).exp();
        assert!((corpus_bleu(&hyp, &reference) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_clipping_limits_repeats() {
        // repeats are clipped to the reference count and no trigram is shared
        let hyp = vec![vec![4, 4, 4, 4]];
        let reference = vec![vec![4, 4, 5, 6]];
        assert_eq!(corpus_bleu(&hyp, &reference), 0.0);
    }

    #[test]
    fn test_empty_hypotheses() {
        assert_eq!(corpus_bleu(&[vec![]], &[vec![4, 5]]), 0.0);
    }

    #[test]
    fn test_logger_appends_rows() {
        let dir = std::env::temp_dir().join(format!("mt_metrics_{}", std::process::id()));
        let logger = MetricsLogger::new(dir.to_string_lossy().to_string()).unwrap();
        logger.log(&metrics(3.0)).unwrap();
        let text = fs::read_to_string(logger.csv_path()).unwrap();
        assert!(text.starts_with("epoch,train_loss,val_loss,val_bleu,skipped_steps\n"));
        assert!(text.contains("1,2.000000,2.100000,3.000000,0"));
        fs::remove_dir_all(dir).ok();
    }
}
