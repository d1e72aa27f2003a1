//! Generation driver: prefill a shared context once, then fork independent
//! trials from the resulting state.
//!
//! Each trial owns a deep copy of the prefix state, so trials can run on
//! separate rayon workers with nothing shared but the read-only weights.

use anyhow::{bail, Context, Result};
use ndarray::Array1;
use rayon::prelude::*;
use rwkvforge_rwkv::{
    RecurrentState, RwkvModel, Sampler, SamplingParams, StreamDecoder, TokenCodec,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::info;

pub const DEFAULT_CONTEXT: &str = "\nIn a shocking finding, scientist discovered a herd of \
    dragons living in a remote, previously unexplored valley, in Tibet. Even more surprising to \
    the researchers was the fact that the dragons spoke perfect Chinese.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub context: String,
    pub num_trials: usize,
    pub length_per_trial: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Trial `i` samples with `seed + i`; unseeded runs draw from OS entropy.
    pub seed: Option<u64>,
    pub parallel_trials: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            context: DEFAULT_CONTEXT.to_string(),
            num_trials: 3,
            length_per_trial: 100,
            temperature: 1.0,
            top_p: 0.85,
            seed: None,
            parallel_trials: false,
        }
    }
}

impl GenerationConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("failed to read generation config {}", path.display()))?;
        let config = serde_json::from_slice(&data).context("failed to parse generation config")?;
        Ok(config)
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }

    fn trial_seed(&self, trial: usize) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(trial as u64))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial: usize,
    pub tokens: Vec<usize>,
    pub text: String,
    pub decode_ms: f64,
    pub tokens_per_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generated_at_unix_ms: u128,
    pub prompt_tokens: usize,
    pub prefill_ms: f64,
    pub state_bytes: usize,
    pub trials: Vec<TrialResult>,
}

impl GenerationReport {
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)?;
        Ok(())
    }
}

/// Logits and state after the shared context.
#[derive(Debug, Clone)]
pub struct Prefix {
    pub logits: Array1<f32>,
    pub state: RecurrentState,
    pub prompt_tokens: usize,
    pub prefill_ms: f64,
}

pub struct GenerationSession<'a> {
    model: &'a RwkvModel,
    codec: &'a dyn TokenCodec,
    config: GenerationConfig,
}

impl<'a> GenerationSession<'a> {
    pub fn new(model: &'a RwkvModel, codec: &'a dyn TokenCodec, config: GenerationConfig) -> Self {
        Self {
            model,
            codec,
            config,
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn prefill(&self) -> Result<Prefix> {
        let tokens = self
            .codec
            .encode(&self.config.context)
            .context("failed to tokenize context")?;
        let vocab_size = self.model.config().vocab_size;
        if let Some(&bad) = tokens.iter().find(|&&t| t >= vocab_size) {
            bail!("context token {} outside model vocabulary of {}", bad, vocab_size);
        }

        let start = Instant::now();
        let Some((logits, state)) = self.model.prefill(&tokens, None) else {
            bail!("context is empty; nothing to condition on");
        };
        let prefill_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(tokens = tokens.len(), prefill_ms, "context prefilled");

        Ok(Prefix {
            logits,
            state,
            prompt_tokens: tokens.len(),
            prefill_ms,
        })
    }

    /// Samples one trial from a fork of `prefix`, writing text to `sink` as
    /// soon as it forms complete characters.
    pub fn run_trial(
        &self,
        prefix: &Prefix,
        trial: usize,
        sink: &mut dyn Write,
    ) -> Result<TrialResult> {
        let mut sampler = Sampler::new(self.config.trial_seed(trial));
        let mut decoder = StreamDecoder::new();
        let mut text = String::new();
        let mut write_error = None;

        let (tokens, _state, metrics) = self.model.generate(
            prefix.logits.clone(),
            prefix.state.clone(),
            &mut sampler,
            self.config.sampling(),
            self.config.length_per_trial,
            |token| {
                if write_error.is_some() {
                    return;
                }
                let chunk = match decoder.push(token, self.codec) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        write_error = Some(anyhow::Error::new(e));
                        return;
                    }
                };
                if let Some(chunk) = chunk {
                    if let Err(e) = sink.write_all(chunk.as_bytes()).and_then(|_| sink.flush()) {
                        write_error = Some(anyhow::Error::new(e));
                        return;
                    }
                    text.push_str(&chunk);
                }
            },
        )?;
        if let Some(e) = write_error {
            return Err(e.context(format!("trial {} failed to emit text", trial)));
        }

        info!(
            trial,
            tokens = metrics.tokens_generated,
            tokens_per_sec = metrics.tokens_per_sec,
            "trial completed"
        );

        Ok(TrialResult {
            trial,
            tokens,
            text,
            decode_ms: metrics.decode_ms,
            tokens_per_sec: metrics.tokens_per_sec,
        })
    }

    /// Prefills the context and runs every trial, printing each one after a
    /// header line.
    pub fn run(&self, out: &mut dyn Write) -> Result<GenerationReport> {
        let prefix = self.prefill()?;

        let trials = if self.config.parallel_trials {
            let buffered = (0..self.config.num_trials)
                .into_par_iter()
                .map(|trial| {
                    let mut buffer = Vec::new();
                    let result = self.run_trial(&prefix, trial, &mut buffer)?;
                    Ok((result, buffer))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut trials = Vec::with_capacity(buffered.len());
            for (result, buffer) in buffered {
                self.write_header(out, result.trial)?;
                out.write_all(&buffer)?;
                trials.push(result);
            }
            trials
        } else {
            let mut trials = Vec::with_capacity(self.config.num_trials);
            for trial in 0..self.config.num_trials {
                self.write_header(out, trial)?;
                trials.push(self.run_trial(&prefix, trial, out)?);
            }
            trials
        };
        writeln!(out)?;
        out.flush()?;

        Ok(GenerationReport {
            generated_at_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0),
            prompt_tokens: prefix.prompt_tokens,
            prefill_ms: prefix.prefill_ms,
            state_bytes: prefix.state.bytes(),
            trials,
        })
    }

    fn write_header(&self, out: &mut dyn Write, trial: usize) -> Result<()> {
        write!(
            out,
            "\n\n--[ Trial {} ]-----------------{}",
            trial, self.config.context
        )?;
        Ok(())
    }
}
