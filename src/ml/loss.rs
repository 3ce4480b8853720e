// ============================================================
// Layer 5 — Label-Smoothed Cross-Entropy
// ============================================================
// Instead of a one-hot target the model is trained towards
//
//   q(c)        = 1 − ε                 for the true class c
//   q(k)        = ε / (V − 1)           for every other class k
//   q(pad_id)   = 0                     pad is never a valid output
//
//   loss = Σ_positions  w · ( −Σ_k q(k) · log p(k) )  /  Σ w
//
// with w = 0 where the target itself is pad and 1 otherwise.
// Padding therefore contributes nothing to the value or the
// gradient.
//
// Reference: Szegedy et al. (2016) Rethinking the Inception Architecture §7

use burn::{prelude::*, tensor::activation::log_softmax};

use crate::error::{ModelError, Result as ModelResult};

#[derive(Config, Debug)]
pub struct LabelSmoothingLossConfig {
    pub pad_id:    usize,
    /// ε, the mass taken from the true class. Must lie in [0, 1).
    #[config(default = 0.1)]
    pub smoothing: f64,
}

impl LabelSmoothingLossConfig {
    pub fn init(&self) -> ModelResult<LabelSmoothingLoss> {
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ModelError::InvalidConfig(format!(
                "label smoothing must lie in [0, 1), got {}",
                self.smoothing
            )));
        }
        Ok(LabelSmoothingLoss { pad_id: self.pad_id, smoothing: self.smoothing })
    }
}

#[derive(Debug, Clone)]
pub struct LabelSmoothingLoss {
    pub pad_id:    usize,
    pub smoothing: f64,
}

impl LabelSmoothingLoss {
    /// Smoothed target rows. targets: [n] → [n, vocab]
    pub fn target_distribution<B: Backend>(
        &self,
        targets: Tensor<B, 1, Int>,
        vocab:   usize,
    ) -> ModelResult<Tensor<B, 2>> {
        if self.pad_id >= vocab {
            return Err(ModelError::ShapeMismatch(format!(
                "pad id {} is outside a vocabulary of {vocab}",
                self.pad_id
            )));
        }
        let [n]    = targets.dims();
        let device = targets.device();
        let off    = if vocab > 1 { self.smoothing / (vocab - 1) as f64 } else { 0.0 };
        let on     = 1.0 - self.smoothing;

        // scatter adds, so lift the label column from `off` to `on`
        let dist = Tensor::<B, 2>::full([n, vocab], off, &device).scatter(
            1,
            targets.reshape([n, 1]),
            Tensor::full([n, 1], on - off, &device),
        );
        Ok(dist.slice_assign(
            [0..n, self.pad_id..self.pad_id + 1],
            Tensor::zeros([n, 1], &device),
        ))
    }

    /// logits: [batch, seq, vocab], targets: [batch, seq] → mean loss over
    /// non-pad positions, shape [1].
    pub fn forward<B: Backend>(
        &self,
        logits:  Tensor<B, 3>,
        targets: Tensor<B, 2, Int>,
    ) -> ModelResult<Tensor<B, 1>> {
        let [batch, seq_len, vocab] = logits.dims();
        if targets.dims() != [batch, seq_len] {
            return Err(ModelError::ShapeMismatch(format!(
                "logits are [{batch}, {seq_len}, {vocab}] but targets are {:?}",
                targets.dims()
            )));
        }
        let n = batch * seq_len;
        if n == 0 {
            return Err(ModelError::EmptyBatch);
        }

        let targets   = targets.reshape([n]);
        let log_probs = log_softmax(logits.reshape([n, vocab]), 1);
        let dist      = self.target_distribution(targets.clone(), vocab)?;

        let per_token = (dist * log_probs).sum_dim(1).reshape([n]).neg();
        let weights   = targets.not_equal_elem(self.pad_id as i64).float();
        let count     = weights.clone().sum().clamp_min(1.0);

        Ok((per_token * weights).sum() / count)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_smoothed_row_matches_expected() {
        let device = Default::default();
        let loss   = LabelSmoothingLossConfig::new(0).init().unwrap();
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([2], &device);
        let row: Vec<f32> = loss
            .target_distribution(labels, 5)
            .unwrap()
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();
        let expected = [0.0, 0.025, 0.9, 0.025, 0.025];
        for (got, want) in row.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "{row:?}");
        }
    }

    #[test]
    fn test_uniform_logits() {
        // log p = −ln 5 everywhere; row mass is 0.975
        let device = Default::default();
        let loss   = LabelSmoothingLossConfig::new(0).init().unwrap();
        let logits = Tensor::<TestBackend, 3>::zeros([1, 2, 5], &device);
        let labels = Tensor::<TestBackend, 2, Int>::from_ints([[2, 4]], &device);
        let value  = scalar(loss.forward(logits, labels).unwrap());
        assert!((value - 0.975 * 5f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_padding_positions_do_not_count() {
        let device = Default::default();
        let loss   = LabelSmoothingLossConfig::new(0).init().unwrap();
        let logits = Tensor::<TestBackend, 3>::random([1, 4, 6], Distribution::Normal(0.0, 1.0), &device);
        let other  = logits.clone().slice_assign(
            [0..1, 2..4, 0..6],
            Tensor::random([1, 2, 6], Distribution::Normal(0.0, 10.0), &device),
        );
        let labels = Tensor::<TestBackend, 2, Int>::from_ints([[3, 5, 0, 0]], &device);

        let a = scalar(loss.forward(logits, labels.clone()).unwrap());
        let b = scalar(loss.forward(other, labels).unwrap());
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_all_padding_is_zero_not_nan() {
        let device = Default::default();
        let loss   = LabelSmoothingLossConfig::new(0).init().unwrap();
        let logits = Tensor::<TestBackend, 3>::ones([2, 2, 4], &device);
        let labels = Tensor::<TestBackend, 2, Int>::zeros([2, 2], &device);
        assert_eq!(scalar(loss.forward(logits, labels).unwrap()), 0.0);
    }

    #[test]
    fn test_confident_correct_beats_confident_wrong() {
        let device = Default::default();
        let loss   = LabelSmoothingLossConfig::new(0).with_smoothing(0.0).init().unwrap();
        let right  = Tensor::<TestBackend, 3>::from_floats([[[0.0, 0.0, 8.0]]], &device);
        let wrong  = Tensor::<TestBackend, 3>::from_floats([[[0.0, 8.0, 0.0]]], &device);
        let labels = Tensor::<TestBackend, 2, Int>::from_ints([[2]], &device);
        let r = scalar(loss.forward(right, labels.clone()).unwrap());
        let w = scalar(loss.forward(wrong, labels).unwrap());
        assert!(r < w);
    }

    #[test]
    fn test_smoothing_out_of_range() {
        assert!(LabelSmoothingLossConfig::new(0).with_smoothing(1.0).init().is_err());
        assert!(LabelSmoothingLossConfig::new(0).with_smoothing(-0.1).init().is_err());
    }
}
