//! Full model: embedding, stacked recurrent layers, output head.

use crate::channel_mix::channel_mixing;
use crate::config::ModelConfig;
use crate::error::SamplerError;
use crate::sampler::Sampler;
use crate::state::RecurrentState;
use crate::time_mix::time_mixing;
use crate::weights::{LayerNormWeights, WeightSet};
use ndarray::{Array1, ArrayView1};
use rwkvforge_kernels::{layer_norm, matvec};
use std::time::Instant;

pub struct RwkvModel {
    config: ModelConfig,
    weights: WeightSet,
}

#[derive(Debug, Clone)]
pub struct GenerationMetrics {
    pub decode_ms: f64,
    pub tokens_generated: usize,
    pub tokens_per_sec: f64,
    /// Size of the recurrent state; independent of sequence length.
    pub state_bytes: usize,
}

/// Sampling knobs for [`RwkvModel::generate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.85,
        }
    }
}

impl RwkvModel {
    pub fn new(weights: WeightSet) -> Self {
        let config = ModelConfig::from_weights(&weights);
        Self { config, weights }
    }

    /// # Panics
    ///
    /// Panics if `config` disagrees with the geometry of `weights`.
    pub fn with_config(config: ModelConfig, weights: WeightSet) -> Self {
        let actual = ModelConfig::from_weights(&weights);
        assert!(
            config.vocab_size == actual.vocab_size
                && config.n_embd == actual.n_embd
                && config.n_layers == actual.n_layers
                && config.ffn_dim == actual.ffn_dim,
            "config {:?} does not match weights {:?}",
            config,
            actual
        );
        Self { config, weights }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn weights(&self) -> &WeightSet {
        &self.weights
    }

    /// Zeroed state with the log-scale slots at the -inf sentinel.
    pub fn initial_state(&self) -> RecurrentState {
        RecurrentState::new(self.config.n_layers, self.config.n_embd)
    }

    /// Advances the model by one token.
    ///
    /// The state is rewritten in place and handed back; clone it first to
    /// keep an independent continuation.
    ///
    /// # Panics
    ///
    /// Panics if `token` is outside the vocabulary or `state` was built for a
    /// different geometry.
    pub fn step(
        &self,
        token: usize,
        state: Option<RecurrentState>,
    ) -> (Array1<f32>, RecurrentState) {
        assert!(
            token < self.config.vocab_size,
            "token {} outside vocabulary of {}",
            token,
            self.config.vocab_size
        );
        let mut state = state.unwrap_or_else(|| self.initial_state());
        assert!(
            state.n_layers() == self.config.n_layers && state.n_embd() == self.config.n_embd,
            "state geometry {}x{} does not match model {}x{}",
            state.n_layers(),
            state.n_embd(),
            self.config.n_layers,
            self.config.n_embd
        );

        let mut x = self.norm(self.weights.emb.row(token), &self.weights.ln0);
        for (layer_idx, layer) in self.weights.layers.iter().enumerate() {
            let normed = self.norm(x.view(), &layer.ln1);
            x += &time_mixing(normed.view(), &mut state, layer_idx, &layer.att);

            let normed = self.norm(x.view(), &layer.ln2);
            x += &channel_mixing(normed.view(), &mut state, layer_idx, &layer.ffn);
        }

        let x = self.norm(x.view(), &self.weights.ln_out);
        let logits = matvec(self.weights.head.view(), x.view());
        (logits, state)
    }

    /// Feeds a whole prompt and returns the logits after its last token.
    /// Returns `None` for an empty prompt.
    pub fn prefill(
        &self,
        tokens: &[usize],
        state: Option<RecurrentState>,
    ) -> Option<(Array1<f32>, RecurrentState)> {
        let (&first, rest) = tokens.split_first()?;
        let mut out = self.step(first, state);
        for &token in rest {
            out = self.step(token, Some(out.1));
        }
        Some(out)
    }

    /// Samples `length` tokens starting from `logits`/`state`, calling
    /// `on_token` after every draw.
    pub fn generate<F>(
        &self,
        mut logits: Array1<f32>,
        mut state: RecurrentState,
        sampler: &mut Sampler,
        params: SamplingParams,
        length: usize,
        mut on_token: F,
    ) -> Result<(Vec<usize>, RecurrentState, GenerationMetrics), SamplerError>
    where
        F: FnMut(usize),
    {
        let decode_start = Instant::now();
        let mut generated = Vec::with_capacity(length);
        for _ in 0..length {
            let token = sampler.draw(logits.view(), params.temperature, params.top_p)?;
            generated.push(token);
            on_token(token);
            let (next_logits, next_state) = self.step(token, Some(state));
            logits = next_logits;
            state = next_state;
        }
        let decode_ms = decode_start.elapsed().as_secs_f64() * 1000.0;

        let tokens_per_sec = if decode_ms > 0.0 {
            (generated.len() as f64 / decode_ms) * 1000.0
        } else {
            0.0
        };

        let metrics = GenerationMetrics {
            decode_ms,
            tokens_generated: generated.len(),
            tokens_per_sec,
            state_bytes: state.bytes(),
        };
        Ok((generated, state, metrics))
    }

    fn norm(&self, x: ArrayView1<'_, f32>, ln: &LayerNormWeights) -> Array1<f32> {
        layer_norm(x, ln.weight.view(), ln.bias.view(), self.config.layer_norm_eps)
    }
}
