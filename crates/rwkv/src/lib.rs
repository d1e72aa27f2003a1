//! Constant-memory RWKV language model evaluation.
//!
//! This crate implements the RWKV-4 recurrent formulation:
//! - Safetensors weight loading into fixed per-layer records
//! - A fixed-size recurrent state instead of a KV-cache
//! - Time mixing with a log-domain stabilized running average
//! - Channel mixing with squared-ReLU gating
//! - Temperature + nucleus sampling
//!
//! One token is processed per [`RwkvModel::step`]; cloning the returned
//! [`RecurrentState`] forks an independent continuation.

pub mod channel_mix;
pub mod config;
pub mod error;
pub mod model;
pub mod sampler;
pub mod state;
pub mod time_mix;
pub mod tokenizer;
pub mod weights;

pub use config::ModelConfig;
pub use error::{LoadError, SamplerError, TokenizerError};
pub use model::{GenerationMetrics, RwkvModel, SamplingParams};
pub use sampler::Sampler;
pub use state::{RecurrentState, Slot};
pub use tokenizer::{ByteTokenizer, StreamDecoder, TextTokenizer, TokenCodec};
pub use weights::{RawTensor, WeightSet};
