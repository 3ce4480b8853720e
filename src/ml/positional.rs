// ============================================================
// Layer 5 — Sinusoidal Positional Encoding
// ============================================================
// Attention has no notion of order, so every position gets a
// fixed signature added to its token embedding:
//
//   PE(pos, 2i)   = sin(pos / 10000^(2i / d_model))
//   PE(pos, 2i+1) = cos(pos / 10000^(2i / d_model))
//
// The table is built once on the host up to max_seq_len and
// stored as a constant tensor. It is never updated by the
// optimiser. Each forward slices the first `seq_len` rows.
//
// Reference: Vaswani et al. (2017) §3.5

use burn::{
    nn::{Dropout, DropoutConfig},
    prelude::*,
    tensor::TensorData,
};

use crate::error::{ModelError, Result as ModelResult};

/// Base of the geometric progression of wavelengths.
const TIMESCALE_BASE: f64 = 10_000.0;

/// Build the sinusoid table as a row-major `[max_len, d_model]` buffer.
///
/// Works for odd `d_model`: the last column is a sine with no cosine partner.
pub fn sinusoid_table(max_len: usize, d_model: usize) -> Vec<f32> {
    let mut table = vec![0.0f32; max_len * d_model];
    for pos in 0..max_len {
        for col in 0..d_model {
            // Columns 2i and 2i+1 share the frequency of pair i.
            let pair     = (col / 2) as f64;
            let exponent = 2.0 * pair / d_model as f64;
            let angle    = pos as f64 / TIMESCALE_BASE.powf(exponent);
            table[pos * d_model + col] = if col % 2 == 0 {
                angle.sin() as f32
            } else {
                angle.cos() as f32
            };
        }
    }
    table
}

#[derive(Config, Debug)]
pub struct PositionalEncodingConfig {
    pub d_model: usize,
    /// Longest sequence the table covers.
    pub max_len: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl PositionalEncodingConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ModelResult<PositionalEncoding<B>> {
        if self.d_model == 0 || self.max_len == 0 {
            return Err(ModelError::InvalidConfig(format!(
                "positional table needs d_model > 0 and max_len > 0 (got {} and {})",
                self.d_model, self.max_len
            )));
        }
        let data  = TensorData::new(
            sinusoid_table(self.max_len, self.d_model),
            [1, self.max_len, self.d_model],
        );
        let table = Tensor::<B, 3>::from_data(data, device);
        Ok(PositionalEncoding {
            table,
            max_len: self.max_len,
            d_model: self.d_model,
            dropout: DropoutConfig::new(self.dropout).init(),
        })
    }
}

#[derive(Module, Debug)]
pub struct PositionalEncoding<B: Backend> {
    /// Constant `[1, max_len, d_model]` table.
    pub table:   Tensor<B, 3>,
    pub max_len: usize,
    pub d_model: usize,
    pub dropout: Dropout,
}

impl<B: Backend> PositionalEncoding<B> {
    /// x: [batch, seq_len, d_model] → same shape, positions added, dropout applied.
    pub fn forward(&self, x: Tensor<B, 3>) -> ModelResult<Tensor<B, 3>> {
        let [batch, seq_len, d_model] = x.dims();
        if seq_len > self.max_len {
            return Err(ModelError::SequenceTooLong { len: seq_len, max: self.max_len });
        }
        if d_model != self.d_model {
            return Err(ModelError::ShapeMismatch(format!(
                "positional encoding expects d_model {}, got {}",
                self.d_model, d_model
            )));
        }
        let positions = self
            .table
            .clone()
            .slice([0..1, 0..seq_len, 0..d_model])
            .expand([batch, seq_len, d_model]);
        Ok(self.dropout.forward(x + positions))
    }
}
