// ============================================================
// Layer 5 — Encoder Stack
// ============================================================
// N identical (but independently parameterised) layers, each
//
//   post-norm (default):
//     h  = LayerNorm(x + Dropout(SelfAttn(x, x, x, pad_mask)))
//     h' = LayerNorm(h + Dropout(FFN(h)))
//
//   pre-norm (norm_first = true):
//     h  = x + Dropout(SelfAttn(LN(x), LN(x), LN(x), pad_mask))
//     h' = h + Dropout(FFN(LN(h)))
//
// Pre-norm stacks end with one extra LayerNorm. The output of
// the stack is the "memory" read by every decoder layer.
//
// Reference: Vaswani et al. (2017) §3.1
//            Xiong et al. (2020) On Layer Normalization in the Transformer

use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig},
    prelude::*,
};

use crate::error::Result as ModelResult;
use crate::ml::{
    attention::{MultiHeadAttention, MultiHeadAttentionConfig},
    feed_forward::{Activation, FeedForward, FeedForwardConfig},
};

#[derive(Config, Debug)]
pub struct EncoderConfig {
    pub d_model:    usize,
    pub num_heads:  usize,
    pub d_ff:       usize,
    pub num_layers: usize,
    #[config(default = 0.1)]
    pub dropout:    f64,
    #[config(default = "Activation::Relu")]
    pub activation: Activation,
    #[config(default = false)]
    pub norm_first: bool,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ModelResult<Encoder<B>> {
        let layers = (0..self.num_layers)
            .map(|_| self.init_layer(device))
            .collect::<ModelResult<Vec<_>>>()?;
        let final_norm = self
            .norm_first
            .then(|| LayerNormConfig::new(self.d_model).init(device));
        Ok(Encoder { layers, final_norm })
    }

    fn init_layer<B: Backend>(&self, device: &B::Device) -> ModelResult<EncoderLayer<B>> {
        let self_attn = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init::<B>(device)?;
        let feed_forward = FeedForwardConfig::new(self.d_model, self.d_ff)
            .with_dropout(self.dropout)
            .with_activation(self.activation)
            .init::<B>(device)?;
        Ok(EncoderLayer {
            self_attn,
            feed_forward,
            norm_attn:  LayerNormConfig::new(self.d_model).init(device),
            norm_ffn:   LayerNormConfig::new(self.d_model).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
            norm_first: self.norm_first,
        })
    }
}

#[derive(Module, Debug)]
pub struct EncoderLayer<B: Backend> {
    pub self_attn:    MultiHeadAttention<B>,
    pub feed_forward: FeedForward<B>,
    pub norm_attn:    LayerNorm<B>,
    pub norm_ffn:     LayerNorm<B>,
    pub dropout:      Dropout,
    pub norm_first:   bool,
}

impl<B: Backend> EncoderLayer<B> {
    /// x: [batch, src_len, d_model], mask: [batch, 1, 1, src_len]
    pub fn forward(&self, x: Tensor<B, 3>, mask: Option<Tensor<B, 4, Bool>>) -> Tensor<B, 3> {
        if self.norm_first {
            let normed = self.norm_attn.forward(x.clone());
            let attn   = self.self_attn.forward(normed.clone(), normed.clone(), normed, mask);
            let h      = x + self.dropout.forward(attn);
            let ffn    = self.feed_forward.forward(self.norm_ffn.forward(h.clone()));
            h + self.dropout.forward(ffn)
        } else {
            let attn = self.self_attn.forward(x.clone(), x.clone(), x.clone(), mask);
            let h    = self.norm_attn.forward(x + self.dropout.forward(attn));
            let ffn  = self.feed_forward.forward(h.clone());
            self.norm_ffn.forward(h + self.dropout.forward(ffn))
        }
    }
}

#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub layers:     Vec<EncoderLayer<B>>,
    pub final_norm: Option<LayerNorm<B>>,
}

impl<B: Backend> Encoder<B> {
    /// Runs every layer in order and returns the memory.
    pub fn forward(&self, x: Tensor<B, 3>, mask: Option<Tensor<B, 4, Bool>>) -> Tensor<B, 3> {
        let mut h = x;
        for layer in &self.layers {
            h = layer.forward(h, mask.clone());
        }
        match &self.final_norm {
            Some(norm) => norm.forward(h),
            None => h,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::mask::padding_mask;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn config() -> EncoderConfig {
        EncoderConfig::new(8, 2, 16, 2).with_dropout(0.0)
    }

    #[test]
    fn test_stack_preserves_shape() {
        let device  = Default::default();
        let encoder = config().init::<TestBackend>(&device).unwrap();
        assert_eq!(encoder.num_layers(), 2);
        assert!(encoder.final_norm.is_none());

        let x = Tensor::<TestBackend, 3>::random([3, 6, 8], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(encoder.forward(x, None).dims(), [3, 6, 8]);
    }

    #[test]
    fn test_pre_norm_has_final_norm() {
        let device  = Default::default();
        let encoder = config().with_norm_first(true).init::<TestBackend>(&device).unwrap();
        assert!(encoder.final_norm.is_some());
        let x = Tensor::<TestBackend, 3>::random([1, 4, 8], Distribution::Normal(0.0, 1.0), &device);
        let out: Vec<f32> = encoder.forward(x, None).into_data().convert::<f32>().to_vec().unwrap();
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_real_positions_ignore_padding() {
        let device  = Default::default();
        let encoder = config().init::<TestBackend>(&device).unwrap();
        let x       = Tensor::<TestBackend, 3>::random([1, 5, 8], Distribution::Normal(0.0, 1.0), &device);
        let noise   = Tensor::<TestBackend, 3>::random([1, 2, 8], Distribution::Normal(0.0, 4.0), &device);
        let x2      = x.clone().slice_assign([0..1, 3..5, 0..8], noise);
        let tokens  = Tensor::<TestBackend, 2, Int>::from_ints([[7, 8, 9, 0, 0]], &device);

        let a: Vec<f32> = encoder
            .forward(x, Some(padding_mask(tokens.clone(), 0)))
            .slice([0..1, 0..3, 0..8])
            .into_data().convert::<f32>().to_vec().unwrap();
        let b: Vec<f32> = encoder
            .forward(x2, Some(padding_mask(tokens, 0)))
            .slice([0..1, 0..3, 0..8])
            .into_data().convert::<f32>().to_vec().unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            assert!((p - q).abs() < 1e-4);
        }
    }
}
