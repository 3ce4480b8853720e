//! Error types for the translation model core.

use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by the model, the loss and the schedule.
///
/// Application and CLI layers wrap these in `anyhow::Error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// `d_model` cannot be split evenly across the attention heads.
    #[error("d_model ({d_model}) is not divisible by num_heads ({num_heads})")]
    HeadsDoNotDivide { d_model: usize, num_heads: usize },

    /// Any other rejected hyperparameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor shapes do not line up.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A sequence is longer than the positional table.
    #[error("sequence length {len} exceeds max_seq_len {max}")]
    SequenceTooLong { len: usize, max: usize },

    /// The learning-rate schedule is undefined at step 0.
    #[error("learning-rate schedule is undefined at step 0")]
    ScheduleStepZero,

    /// The loss came back as NaN or infinite.
    #[error("non-finite loss {value} at step {step}")]
    NonFiniteLoss { step: usize, value: f64 },

    /// A gradient contained NaN or infinite values.
    #[error("non-finite gradient at step {step}")]
    NonFiniteGradient { step: usize },

    /// A batch with no sequences was handed to the model.
    #[error("empty batch")]
    EmptyBatch,

    /// A token id is outside the vocabulary.
    #[error("token id {id} is outside the vocabulary (size {vocab_size})")]
    TokenOutOfRange { id: u32, vocab_size: usize },

    /// Reading tensor data back to the host failed.
    #[error("tensor data error: {0}")]
    Tensor(String),
}

impl From<burn::tensor::DataError> for ModelError {
    fn from(err: burn::tensor::DataError) -> Self {
        ModelError::Tensor(format!("{err:?}"))
    }
}
