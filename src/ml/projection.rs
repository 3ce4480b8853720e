// ============================================================
// Layer 5 — Output Projection
// ============================================================
// Maps decoder states to vocabulary logits: d_model → vocab.
//
// Two variants:
//   - own Linear layer
//   - tied: reuse the target embedding table transposed, plus a
//     learned bias. The table is passed in at call time so both
//     ends receive the gradient of a single parameter.

use burn::{
    module::Param,
    nn::{Initializer, Linear, LinearConfig},
    prelude::*,
};

use crate::error::{ModelError, Result as ModelResult};

#[derive(Config, Debug)]
pub struct OutputProjectionConfig {
    pub d_model:    usize,
    pub vocab_size: usize,
    #[config(default = true)]
    pub tied:       bool,
}

impl OutputProjectionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> OutputProjection<B> {
        if self.tied {
            OutputProjection {
                linear:     None,
                tied_bias:  Some(Param::from_tensor(Tensor::zeros([self.vocab_size], device))),
                vocab_size: self.vocab_size,
            }
        } else {
            let linear = LinearConfig::new(self.d_model, self.vocab_size)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device);
            OutputProjection { linear: Some(linear), tied_bias: None, vocab_size: self.vocab_size }
        }
    }
}

#[derive(Module, Debug)]
pub struct OutputProjection<B: Backend> {
    pub linear:     Option<Linear<B>>,
    pub tied_bias:  Option<Param<Tensor<B, 1>>>,
    pub vocab_size: usize,
}

impl<B: Backend> OutputProjection<B> {
    pub fn is_tied(&self) -> bool {
        self.linear.is_none()
    }

    /// hidden: [batch, seq, d_model] → logits [batch, seq, vocab]
    ///
    /// `embedding` is the `[vocab, d_model]` target table; it is only read
    /// when the projection is tied.
    pub fn forward(&self, hidden: Tensor<B, 3>, embedding: Option<Tensor<B, 2>>) -> ModelResult<Tensor<B, 3>> {
        if let Some(linear) = &self.linear {
            return Ok(linear.forward(hidden));
        }
        let weight = embedding.ok_or_else(|| {
            ModelError::InvalidConfig("tied output projection needs the embedding table".into())
        })?;

        let [batch, seq_len, d_model] = hidden.dims();
        let [vocab, table_width] = weight.dims();
        if vocab != self.vocab_size || table_width != d_model {
            return Err(ModelError::ShapeMismatch(format!(
                "tied table is [{vocab}, {table_width}], expected [{}, {d_model}]",
                self.vocab_size
            )));
        }

        let logits = hidden
            .reshape([batch * seq_len, d_model])
            .matmul(weight.transpose());
        let logits = match &self.tied_bias {
            Some(bias) => logits + bias.val().unsqueeze::<2>().expand([batch * seq_len, vocab]),
            None => logits,
        };
        Ok(logits.reshape([batch, seq_len, vocab]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_tied_uses_embedding_rows() {
        let device = Default::default();
        let proj   = OutputProjectionConfig::new(3, 4).init::<TestBackend>(&device);
        assert!(proj.is_tied());

        // Identity-like table: row v has a 1 in column v (for v < 3).
        let table = Tensor::<TestBackend, 2>::from_floats(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]],
            &device,
        );
        let hidden = Tensor::<TestBackend, 3>::from_floats([[[0.5, 2.0, -1.0]]], &device);
        let logits: Vec<f32> = proj
            .forward(hidden, Some(table))
            .unwrap()
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();
        assert_eq!(logits, vec![0.5, 2.0, -1.0, 0.0]);
    }

    #[test]
    fn test_tied_without_table_is_error() {
        let device = Default::default();
        let proj   = OutputProjectionConfig::new(3, 4).init::<TestBackend>(&device);
        let hidden = Tensor::<TestBackend, 3>::zeros([1, 2, 3], &device);
        assert!(proj.forward(hidden, None).is_err());
    }

    #[test]
    fn test_untied_shape() {
        let device = Default::default();
        let proj   = OutputProjectionConfig::new(8, 11)
            .with_tied(false)
            .init::<TestBackend>(&device);
        let hidden = Tensor::<TestBackend, 3>::random([2, 3, 8], Distribution::Default, &device);
        assert_eq!(proj.forward(hidden, None).unwrap().dims(), [2, 3, 11]);
    }
}
