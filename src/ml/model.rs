// ============================================================
// Layer 5 — Encoder–Decoder Transformer
// ============================================================
// Assembles the building blocks:
//
//   src ids ─► embed·√d ─► +PE ─► Encoder ×N ─► memory
//                                                 │
//   tgt ids ─► embed·√d ─► +PE ─► Decoder ×N ◄────┘
//                                   │
//                                   ▼
//                         OutputProjection ─► logits
//
// Weight sharing (both on by default):
//   share_embeddings      — source and target use one table
//                           (requires equal vocab sizes)
//   tie_output_projection — logits = h · E_tgtᵀ + b
//
// Shape contracts are checked on entry to encode / decode and
// reported as ModelError::ShapeMismatch.
//
// Reference: Vaswani et al. (2017)
//            Burn Book §3 (Building Blocks)

use burn::{
    module::{ModuleVisitor, ParamId},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::error::{ModelError, Result as ModelResult};
use crate::ml::{
    attention::MultiHeadAttentionConfig,
    decoder::{Decoder, DecoderConfig},
    embedding::{TokenEmbedding, TokenEmbeddingConfig},
    encoder::{Encoder, EncoderConfig},
    feed_forward::{Activation, FeedForwardConfig},
    loss::LabelSmoothingLoss,
    mask::{decoder_mask, padding_mask},
    positional::{PositionalEncoding, PositionalEncodingConfig},
    projection::{OutputProjection, OutputProjectionConfig},
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct TransformerConfig {
    pub src_vocab_size: usize,
    pub tgt_vocab_size: usize,
    #[config(default = 512)]
    pub d_model:        usize,
    #[config(default = 8)]
    pub num_heads:      usize,
    /// Layers in each of the two stacks.
    #[config(default = 6)]
    pub num_layers:     usize,
    #[config(default = 2048)]
    pub d_ff:           usize,
    #[config(default = 0.1)]
    pub dropout:        f64,
    #[config(default = 128)]
    pub max_seq_len:    usize,
    #[config(default = "Activation::Relu")]
    pub activation:     Activation,
    #[config(default = 0)]
    pub pad_id:         usize,
    #[config(default = true)]
    pub share_embeddings: bool,
    #[config(default = true)]
    pub tie_output_projection: bool,
    /// Pre-norm residual blocks instead of the default post-norm.
    #[config(default = false)]
    pub norm_first:     bool,
}

impl TransformerConfig {
    /// Reject any hyperparameter combination the model cannot be built with.
    pub fn validate(&self) -> ModelResult<()> {
        MultiHeadAttentionConfig::new(self.d_model, self.num_heads).validate()?;
        FeedForwardConfig::new(self.d_model, self.d_ff).validate()?;

        if self.num_layers == 0 || self.max_seq_len == 0 {
            return Err(ModelError::InvalidConfig(
                "num_layers and max_seq_len must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::InvalidConfig(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        for vocab in [self.src_vocab_size, self.tgt_vocab_size] {
            if self.pad_id >= vocab {
                return Err(ModelError::InvalidConfig(format!(
                    "pad id {} does not fit a vocabulary of {vocab}",
                    self.pad_id
                )));
            }
        }
        if self.share_embeddings && self.src_vocab_size != self.tgt_vocab_size {
            return Err(ModelError::InvalidConfig(format!(
                "shared embeddings need equal vocabularies (source {}, target {})",
                self.src_vocab_size, self.tgt_vocab_size
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ModelResult<Transformer<B>> {
        self.validate()?;

        let tgt_embedding = TokenEmbeddingConfig::new(self.tgt_vocab_size, self.d_model).init(device);
        let src_embedding = (!self.share_embeddings)
            .then(|| TokenEmbeddingConfig::new(self.src_vocab_size, self.d_model).init(device));

        let positional = PositionalEncodingConfig::new(self.d_model, self.max_seq_len)
            .with_dropout(self.dropout)
            .init::<B>(device)?;

        let encoder = EncoderConfig::new(self.d_model, self.num_heads, self.d_ff, self.num_layers)
            .with_dropout(self.dropout)
            .with_activation(self.activation)
            .with_norm_first(self.norm_first)
            .init::<B>(device)?;
        let decoder = DecoderConfig::new(self.d_model, self.num_heads, self.d_ff, self.num_layers)
            .with_dropout(self.dropout)
            .with_activation(self.activation)
            .with_norm_first(self.norm_first)
            .init::<B>(device)?;

        let projection = OutputProjectionConfig::new(self.d_model, self.tgt_vocab_size)
            .with_tied(self.tie_output_projection)
            .init(device);

        Ok(Transformer {
            src_embedding,
            tgt_embedding,
            positional,
            encoder,
            decoder,
            projection,
            d_model:     self.d_model,
            pad_id:      self.pad_id,
            max_seq_len: self.max_seq_len,
        })
    }
}

#[derive(Module, Debug)]
pub struct Transformer<B: Backend> {
    /// `None` when the source side shares the target table.
    pub src_embedding: Option<TokenEmbedding<B>>,
    pub tgt_embedding: TokenEmbedding<B>,
    pub positional:    PositionalEncoding<B>,
    pub encoder:       Encoder<B>,
    pub decoder:       Decoder<B>,
    pub projection:    OutputProjection<B>,
    pub d_model:       usize,
    pub pad_id:        usize,
    pub max_seq_len:   usize,
}

impl<B: Backend> Transformer<B> {
    fn source_embedding(&self) -> &TokenEmbedding<B> {
        self.src_embedding.as_ref().unwrap_or(&self.tgt_embedding)
    }

    pub fn src_vocab_size(&self) -> usize {
        self.source_embedding().vocab_size()
    }

    pub fn tgt_vocab_size(&self) -> usize {
        self.tgt_embedding.vocab_size()
    }

    /// src: [batch, src_len], src_mask: [batch, 1, 1, src_len] → memory [batch, src_len, d_model]
    pub fn encode(&self, src: Tensor<B, 2, Int>, src_mask: Tensor<B, 4, Bool>) -> ModelResult<Tensor<B, 3>> {
        let [batch, src_len] = src.dims();
        if batch == 0 || src_len == 0 {
            return Err(ModelError::EmptyBatch);
        }
        let [mask_batch, _, _, mask_keys] = src_mask.dims();
        if mask_batch != batch || mask_keys != src_len {
            return Err(ModelError::ShapeMismatch(format!(
                "source mask {:?} does not cover source [{batch}, {src_len}]",
                src_mask.dims()
            )));
        }
        let x = self.positional.forward(self.source_embedding().forward(src))?;
        Ok(self.encoder.forward(x, Some(src_mask)))
    }

    /// tgt: [batch, tgt_len], memory: [batch, src_len, d_model] → [batch, tgt_len, d_model]
    pub fn decode(
        &self,
        tgt:      Tensor<B, 2, Int>,
        memory:   Tensor<B, 3>,
        src_mask: Tensor<B, 4, Bool>,
        tgt_mask: Tensor<B, 4, Bool>,
    ) -> ModelResult<Tensor<B, 3>> {
        let [batch, tgt_len] = tgt.dims();
        if batch == 0 || tgt_len == 0 {
            return Err(ModelError::EmptyBatch);
        }
        let [mem_batch, src_len, width] = memory.dims();
        if mem_batch != batch || width != self.d_model {
            return Err(ModelError::ShapeMismatch(format!(
                "memory is [{mem_batch}, {src_len}, {width}], expected [{batch}, _, {}]",
                self.d_model
            )));
        }
        if src_mask.dims()[3] != src_len {
            return Err(ModelError::ShapeMismatch(format!(
                "source mask covers {} keys but memory has {src_len}",
                src_mask.dims()[3]
            )));
        }
        let [_, _, mask_q, mask_k] = tgt_mask.dims();
        if mask_q != tgt_len || mask_k != tgt_len {
            return Err(ModelError::ShapeMismatch(format!(
                "target mask {:?} does not match target length {tgt_len}",
                tgt_mask.dims()
            )));
        }
        let y = self.positional.forward(self.tgt_embedding.forward(tgt))?;
        Ok(self.decoder.forward(y, memory, Some(src_mask), Some(tgt_mask)))
    }

    /// hidden: [batch, seq, d_model] → logits [batch, seq, tgt_vocab]
    pub fn project(&self, hidden: Tensor<B, 3>) -> ModelResult<Tensor<B, 3>> {
        let table = self.projection.is_tied().then(|| self.tgt_embedding.weight());
        self.projection.forward(hidden, table)
    }

    /// Full teacher-forced pass. src: [batch, src_len], tgt_in: [batch, tgt_len]
    pub fn forward(&self, src: Tensor<B, 2, Int>, tgt_in: Tensor<B, 2, Int>) -> ModelResult<Tensor<B, 3>> {
        let src_mask = padding_mask(src.clone(), self.pad_id);
        let tgt_mask = decoder_mask(tgt_in.clone(), self.pad_id);
        let memory   = self.encode(src, src_mask.clone())?;
        let hidden   = self.decode(tgt_in, memory, src_mask, tgt_mask)?;
        self.project(hidden)
    }

    /// Shifts `tgt` (which starts with SOS) into decoder input `tgt[:, :-1]`
    /// and labels `tgt[:, 1:]`, then returns the smoothed loss, shape [1].
    pub fn forward_loss(
        &self,
        src:  Tensor<B, 2, Int>,
        tgt:  Tensor<B, 2, Int>,
        loss: &LabelSmoothingLoss,
    ) -> ModelResult<Tensor<B, 1>> {
        let [batch, tgt_len] = tgt.dims();
        if tgt_len < 2 {
            return Err(ModelError::ShapeMismatch(format!(
                "target needs at least SOS and one token, got length {tgt_len}"
            )));
        }
        let tgt_in = tgt.clone().slice([0..batch, 0..tgt_len - 1]);
        let labels = tgt.slice([0..batch, 1..tgt_len]);
        let logits = self.forward(src, tgt_in)?;
        loss.forward(logits, labels)
    }
}

impl<B: AutodiffBackend> Transformer<B> {
    /// True when every parameter gradient present in `grads` holds only
    /// finite values. Parameters outside the graph have no gradient and
    /// are skipped.
    pub fn gradients_are_finite(&self, grads: &B::Gradients) -> bool {
        let mut visitor = FiniteGradients::<B> { grads, finite: true };
        self.visit(&mut visitor);
        visitor.finite
    }
}

/// Walks every float parameter and stops checking at the first
/// gradient with a NaN or Inf.
struct FiniteGradients<'a, B: AutodiffBackend> {
    grads:  &'a B::Gradients,
    finite: bool,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for FiniteGradients<'_, B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if !self.finite {
            return;
        }
        if let Some(grad) = tensor.grad(self.grads) {
            self.finite = grad.abs().sum().into_scalar().elem::<f64>().is_finite();
        }
    }
}
