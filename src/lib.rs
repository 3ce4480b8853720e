#![recursion_limit = "256"]

//! Encoder-decoder Transformer for sentence translation, built on Burn.
//!
//! Layers, outermost first:
//!   - `cli`         argument parsing, printing
//!   - `application` train / translate workflows
//!   - `domain`      token ids, sentence pairs, core traits
//!   - `data`        corpus readers, datasets, batching
//!   - `ml`          model, loss, schedule, decoding, training loop
//!   - `infra`       checkpoints, tokenizer, metrics

pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod infra;
pub mod ml;

pub use error::{ModelError, Result};
