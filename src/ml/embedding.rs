// ============================================================
// Layer 5 — Token Embedding
// ============================================================
// Lookup table of shape [vocab_size, d_model]. The looked-up
// vectors are multiplied by √d_model so their scale matches the
// positional signal added next.
//
// The same table can serve the source side, the target side and
// the output projection (weight tying, see projection.rs).
//
// Reference: Vaswani et al. (2017) §3.4
//            Press & Wolf (2017) Using the Output Embedding

use burn::{
    nn::{Embedding, EmbeddingConfig, Initializer},
    prelude::*,
};

#[derive(Config, Debug)]
pub struct TokenEmbeddingConfig {
    pub vocab_size: usize,
    pub d_model:    usize,
}

impl TokenEmbeddingConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TokenEmbedding<B> {
        // EmbeddingConfig::init gives the initializer no fan values,
        // so Xavier needs the table built here.
        let mut embedding = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        embedding.weight = Initializer::XavierUniform { gain: 1.0 }.init_with(
            [self.vocab_size, self.d_model],
            Some(self.vocab_size),
            Some(self.d_model),
            device,
        );
        TokenEmbedding {
            embedding,
            scale: (self.d_model as f64).sqrt(),
        }
    }
}

#[derive(Module, Debug)]
pub struct TokenEmbedding<B: Backend> {
    pub embedding: Embedding<B>,
    pub scale:     f64,
}

impl<B: Backend> TokenEmbedding<B> {
    /// tokens: [batch, seq_len] → [batch, seq_len, d_model]
    pub fn forward(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        self.embedding.forward(tokens).mul_scalar(self.scale)
    }

    /// The raw `[vocab_size, d_model]` table, tracked by autodiff.
    pub fn weight(&self) -> Tensor<B, 2> {
        self.embedding.weight.val()
    }

    pub fn vocab_size(&self) -> usize {
        self.embedding.weight.val().dims()[0]
    }

    pub fn d_model(&self) -> usize {
        self.embedding.weight.val().dims()[1]
    }
}
