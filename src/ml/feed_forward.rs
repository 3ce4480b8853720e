// ============================================================
// Layer 5 — Position-wise Feed-Forward Network
// ============================================================
//   FFN(x) = W2 · act(W1 · x + b1) + b2
//
// Applied to every position independently. The hidden width
// d_ff must be larger than d_model. Dropout sits between the
// activation and the second projection.

use burn::{
    nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{gelu, relu},
};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result as ModelResult};

/// Non-linearity between the two projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Gelu,
}

#[derive(Config, Debug)]
pub struct FeedForwardConfig {
    pub d_model:    usize,
    pub d_ff:       usize,
    #[config(default = 0.1)]
    pub dropout:    f64,
    #[config(default = "Activation::Relu")]
    pub activation: Activation,
}

impl FeedForwardConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.d_ff <= self.d_model {
            return Err(ModelError::InvalidConfig(format!(
                "d_ff ({}) must be larger than d_model ({})",
                self.d_ff, self.d_model
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ModelResult<FeedForward<B>> {
        self.validate()?;
        let inner = LinearConfig::new(self.d_model, self.d_ff)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        let outer = LinearConfig::new(self.d_ff, self.d_model)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        Ok(FeedForward {
            inner,
            outer,
            dropout:  DropoutConfig::new(self.dropout).init(),
            use_gelu: self.activation == Activation::Gelu,
        })
    }
}

#[derive(Module, Debug)]
pub struct FeedForward<B: Backend> {
    pub inner:    Linear<B>,
    pub outer:    Linear<B>,
    pub dropout:  Dropout,
    pub use_gelu: bool,
}

impl<B: Backend> FeedForward<B> {
    /// [batch, seq, d_model] → [batch, seq, d_model]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let hidden = self.inner.forward(x);
        let hidden = if self.use_gelu { gelu(hidden) } else { relu(hidden) };
        self.outer.forward(self.dropout.forward(hidden))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_shape_preserved() {
        let device = Default::default();
        let ffn = FeedForwardConfig::new(8, 32)
            .with_activation(Activation::Gelu)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 3>::ones([2, 5, 8], &device);
        assert_eq!(ffn.forward(x).dims(), [2, 5, 8]);
    }

    #[test]
    fn test_narrow_hidden_rejected() {
        let err = FeedForwardConfig::new(16, 16)
            .init::<TestBackend>(&Default::default())
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig(_)));
    }

    #[test]
    fn test_position_wise() {
        // Changing one position leaves the others untouched.
        let device = Default::default();
        let ffn = FeedForwardConfig::new(4, 8).init::<TestBackend>(&device).unwrap();
        let a = Tensor::<TestBackend, 3>::ones([1, 3, 4], &device);
        let b = a.clone().slice_assign([0..1, 2..3, 0..4], Tensor::zeros([1, 1, 4], &device));
        let ya: Vec<f32> = ffn.forward(a).slice([0..1, 0..2, 0..4]).into_data().convert::<f32>().to_vec().unwrap();
        let yb: Vec<f32> = ffn.forward(b).slice([0..1, 0..2, 0..4]).into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(ya, yb);
    }
}
