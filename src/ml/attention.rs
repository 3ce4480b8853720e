// ============================================================
// Layer 5 — Multi-Head Attention
// ============================================================
// Scaled dot-product attention run in `num_heads` parallel
// subspaces of width d_k = d_model / num_heads:
//
//   Attention(Q, K, V) = softmax(Q·Kᵀ / √d_k) · V
//
// Steps per call:
//   1. Project query / key / value with W_q, W_k, W_v
//   2. Split the last axis into heads → [batch, heads, len, d_k]
//   3. Scores = Q·Kᵀ / √d_k          → [batch, heads, q_len, k_len]
//   4. Excluded keys get MASK_FILL_VALUE before softmax
//   5. Softmax over the key axis, dropout on the weights
//   6. Weighted sum of V, merge heads, project with W_o
//
// The four projections carry no bias.
//
// Reference: Vaswani et al. (2017) §3.2

use burn::{
    nn::{Dropout, DropoutConfig, Initializer, Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};

use crate::error::{ModelError, Result as ModelResult};

/// Score written into masked positions. Large enough that exp() underflows
/// to exactly zero after the softmax max-subtraction.
pub const MASK_FILL_VALUE: f32 = -1.0e9;

#[derive(Config, Debug)]
pub struct MultiHeadAttentionConfig {
    pub d_model:   usize,
    pub num_heads: usize,
    #[config(default = 0.1)]
    pub dropout:   f64,
}

impl MultiHeadAttentionConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            return Err(ModelError::HeadsDoNotDivide {
                d_model:   self.d_model,
                num_heads: self.num_heads,
            });
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ModelResult<MultiHeadAttention<B>> {
        self.validate()?;
        let projection = || {
            LinearConfig::new(self.d_model, self.d_model)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init::<B>(device)
        };
        Ok(MultiHeadAttention {
            query:     projection(),
            key:       projection(),
            value:     projection(),
            output:    projection(),
            dropout:   DropoutConfig::new(self.dropout).init(),
            num_heads: self.num_heads,
            d_k:       self.d_model / self.num_heads,
        })
    }
}

#[derive(Module, Debug)]
pub struct MultiHeadAttention<B: Backend> {
    pub query:     Linear<B>,
    pub key:       Linear<B>,
    pub value:     Linear<B>,
    pub output:    Linear<B>,
    pub dropout:   Dropout,
    pub num_heads: usize,
    pub d_k:       usize,
}

/// Result of an attention call with the weights kept for inspection.
#[derive(Debug, Clone)]
pub struct AttentionOutput<B: Backend> {
    /// [batch, q_len, d_model]
    pub context: Tensor<B, 3>,
    /// [batch, heads, q_len, k_len], rows sum to 1 over allowed keys.
    pub weights: Tensor<B, 4>,
}

impl<B: Backend> MultiHeadAttention<B> {
    /// query: [batch, q_len, d_model], key/value: [batch, k_len, d_model]
    /// mask:  broadcastable to [batch, heads, q_len, k_len], true = attend
    pub fn forward(
        &self,
        query: Tensor<B, 3>,
        key:   Tensor<B, 3>,
        value: Tensor<B, 3>,
        mask:  Option<Tensor<B, 4, Bool>>,
    ) -> Tensor<B, 3> {
        self.forward_with_weights(query, key, value, mask).context
    }

    pub fn forward_with_weights(
        &self,
        query: Tensor<B, 3>,
        key:   Tensor<B, 3>,
        value: Tensor<B, 3>,
        mask:  Option<Tensor<B, 4, Bool>>,
    ) -> AttentionOutput<B> {
        let [batch, q_len, d_model] = query.dims();
        let k_len = key.dims()[1];

        // ── Project and split into heads ──────────────────────────────────────
        let q = self.split_heads(self.query.forward(query));
        let k = self.split_heads(self.key.forward(key));
        let v = self.split_heads(self.value.forward(value));

        // ── Scaled scores ─────────────────────────────────────────────────────
        let scores = q
            .matmul(k.swap_dims(2, 3))
            .div_scalar((self.d_k as f64).sqrt());

        let scores = match mask {
            Some(mask) => {
                let hidden = mask.bool_not().expand([batch, self.num_heads, q_len, k_len]);
                scores.mask_fill(hidden, MASK_FILL_VALUE)
            }
            None => scores,
        };

        // ── Weights and context ───────────────────────────────────────────────
        let weights = softmax(scores, 3);
        let context = self
            .dropout
            .forward(weights.clone())
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, q_len, d_model]);

        AttentionOutput {
            context: self.output.forward(context),
            weights,
        }
    }

    /// [batch, len, d_model] → [batch, heads, len, d_k]
    fn split_heads(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch, len, _] = x.dims();
        x.reshape([batch, len, self.num_heads, self.d_k]).swap_dims(1, 2)
    }
}
