//! Model geometry for RWKV checkpoints.

use crate::weights::WeightSet;
use rwkvforge_kernels::LAYER_NORM_EPS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub n_embd: usize,
    pub n_layers: usize,
    /// Hidden width of the channel-mixing block.
    pub ffn_dim: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f32,
}

fn default_layer_norm_eps() -> f32 {
    LAYER_NORM_EPS
}

impl ModelConfig {
    /// RWKV-4 Pile 430M (24 layers, 1024 wide, 20B tokenizer vocabulary).
    pub fn rwkv4_pile_430m() -> Self {
        Self {
            vocab_size: 50277,
            n_embd: 1024,
            n_layers: 24,
            ffn_dim: 4096,
            layer_norm_eps: LAYER_NORM_EPS,
        }
    }

    /// Tiny config for tests and the random-weights demo.
    pub fn toy() -> Self {
        Self {
            vocab_size: 16,
            n_embd: 4,
            n_layers: 2,
            ffn_dim: 4,
            layer_norm_eps: LAYER_NORM_EPS,
        }
    }

    /// Byte-level vocabulary for running the CLI on random weights.
    pub fn demo() -> Self {
        Self {
            vocab_size: 256,
            n_embd: 32,
            n_layers: 2,
            ffn_dim: 128,
            layer_norm_eps: LAYER_NORM_EPS,
        }
    }

    /// Geometry as recorded in loaded weights.
    pub fn from_weights(weights: &WeightSet) -> Self {
        Self {
            vocab_size: weights.vocab_size(),
            n_embd: weights.n_embd(),
            n_layers: weights.n_layers(),
            ffn_dim: weights.ffn_dim(),
            layer_norm_eps: LAYER_NORM_EPS,
        }
    }

    /// Rows in the recurrent state buffer: five vectors per layer.
    pub fn state_rows(&self) -> usize {
        self.n_layers * crate::state::SLOTS_PER_LAYER
    }
}
