// ============================================================
// Layer 5 — Decoder Stack
// ============================================================
// Each layer has three sublayers, each wrapped in a residual
// connection and LayerNorm placed as in encoder.rs:
//
//   1. masked self-attention over the target prefix
//      (causal AND padding mask)
//   2. cross-attention: query = decoder state,
//      key/value = encoder memory, mask = source padding
//   3. position-wise feed-forward
//
// Reference: Vaswani et al. (2017) §3.1

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
pub struct DecoderConfig {
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

impl DecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ModelResult<Decoder<B>> {
        let layers = (0..self.num_layers)
            .map(|_| self.init_layer(device))
            .collect::<ModelResult<Vec<_>>>()?;
        let final_norm = self
            .norm_first
            .then(|| LayerNormConfig::new(self.d_model).init(device));
        Ok(Decoder { layers, final_norm })
    }

    fn init_layer<B: Backend>(&self, device: &B::Device) -> ModelResult<DecoderLayer<B>> {
        let attention = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout);
        let feed_forward = FeedForwardConfig::new(self.d_model, self.d_ff)
            .with_dropout(self.dropout)
            .with_activation(self.activation)
            .init::<B>(device)?;
        Ok(DecoderLayer {
            self_attn:  attention.init::<B>(device)?,
            cross_attn: attention.init::<B>(device)?,
            feed_forward,
            norm_self:  LayerNormConfig::new(self.d_model).init(device),
            norm_cross: LayerNormConfig::new(self.d_model).init(device),
            norm_ffn:   LayerNormConfig::new(self.d_model).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
            norm_first: self.norm_first,
        })
    }
}

#[derive(Module, Debug)]
pub struct DecoderLayer<B: Backend> {
    pub self_attn:    MultiHeadAttention<B>,
    pub cross_attn:   MultiHeadAttention<B>,
    pub feed_forward: FeedForward<B>,
    pub norm_self:    LayerNorm<B>,
    pub norm_cross:   LayerNorm<B>,
    pub norm_ffn:     LayerNorm<B>,
    pub dropout:      Dropout,
    pub norm_first:   bool,
}

impl<B: Backend> DecoderLayer<B> {
    /// x:        [batch, tgt_len, d_model]
    /// memory:   [batch, src_len, d_model]
    /// src_mask: [batch, 1, 1, src_len]
    /// tgt_mask: [batch, 1, tgt_len, tgt_len]
    pub fn forward(
        &self,
        x:        Tensor<B, 3>,
        memory:   Tensor<B, 3>,
        src_mask: Option<Tensor<B, 4, Bool>>,
        tgt_mask: Option<Tensor<B, 4, Bool>>,
    ) -> Tensor<B, 3> {
        if self.norm_first {
            let normed = self.norm_self.forward(x.clone());
            let h = x + self.dropout.forward(
                self.self_attn.forward(normed.clone(), normed.clone(), normed, tgt_mask),
            );
            let normed = self.norm_cross.forward(h.clone());
            let h = h + self.dropout.forward(
                self.cross_attn.forward(normed, memory.clone(), memory, src_mask),
            );
            let ffn = self.feed_forward.forward(self.norm_ffn.forward(h.clone()));
            h + self.dropout.forward(ffn)
        } else {
            let attn = self.self_attn.forward(x.clone(), x.clone(), x.clone(), tgt_mask);
            let h    = self.norm_self.forward(x + self.dropout.forward(attn));
            let attn = self.cross_attn.forward(h.clone(), memory.clone(), memory, src_mask);
            let h    = self.norm_cross.forward(h + self.dropout.forward(attn));
            let ffn  = self.feed_forward.forward(h.clone());
            self.norm_ffn.forward(h + self.dropout.forward(ffn))
        }
    }
}

#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub layers:     Vec<DecoderLayer<B>>,
    pub final_norm: Option<LayerNorm<B>>,
}

impl<B: Backend> Decoder<B> {
    pub fn forward(
        &self,
        x:        Tensor<B, 3>,
        memory:   Tensor<B, 3>,
        src_mask: Option<Tensor<B, 4, Bool>>,
        tgt_mask: Option<Tensor<B, 4, Bool>>,
    ) -> Tensor<B, 3> {
        let mut h = x;
        for layer in &self.layers {
            h = layer.forward(h, memory.clone(), src_mask.clone(), tgt_mask.clone());
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
    use crate::ml::mask::{decoder_mask, padding_mask};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn rows(t: Tensor<TestBackend, 3>, upto: usize) -> Vec<f32> {
        let [b, _, d] = t.dims();
        t.slice([0..b, 0..upto, 0..d]).into_data().convert::<f32>().to_vec().unwrap()
    }

    #[test]
    fn test_output_follows_target_shape() {
        let device  = Default::default();
        let decoder = DecoderConfig::new(8, 2, 16, 3)
            .with_dropout(0.0)
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(decoder.num_layers(), 3);

        let memory = Tensor::<TestBackend, 3>::random([2, 7, 8], Distribution::Normal(0.0, 1.0), &device);
        let x      = Tensor::<TestBackend, 3>::random([2, 4, 8], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(decoder.forward(x, memory, None, None).dims(), [2, 4, 8]);
    }

    #[test]
    fn test_prefix_does_not_see_later_positions() {
        let device  = Default::default();
        let decoder = DecoderConfig::new(8, 2, 16, 2)
            .with_dropout(0.0)
            .init::<TestBackend>(&device)
            .unwrap();
        let memory = Tensor::<TestBackend, 3>::random([1, 3, 8], Distribution::Normal(0.0, 1.0), &device);
        let x      = Tensor::<TestBackend, 3>::random([1, 4, 8], Distribution::Normal(0.0, 1.0), &device);
        let later  = Tensor::<TestBackend, 3>::random([1, 2, 8], Distribution::Normal(3.0, 1.0), &device);
        let x2     = x.clone().slice_assign([0..1, 2..4, 0..8], later);

        let src = Tensor::<TestBackend, 2, Int>::from_ints([[4, 5, 6]], &device);
        let tgt = Tensor::<TestBackend, 2, Int>::from_ints([[2, 7, 8, 9]], &device);

        let a = decoder.forward(
            x, memory.clone(),
            Some(padding_mask(src.clone(), 0)), Some(decoder_mask(tgt.clone(), 0)),
        );
        let b = decoder.forward(
            x2, memory,
            Some(padding_mask(src, 0)), Some(decoder_mask(tgt, 0)),
        );
        for (p, q) in rows(a, 2).iter().zip(rows(b, 2).iter()) {
            assert!((p - q).abs() < 1e-4);
        }
    }
}
