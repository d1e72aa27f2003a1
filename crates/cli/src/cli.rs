//! CLI wiring for rwkvforge.

use crate::generation::{GenerationConfig, GenerationSession};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rwkvforge_rwkv::{
    ByteTokenizer, ModelConfig, RwkvModel, TextTokenizer, TokenCodec, WeightSet,
};
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

/// Seed for the random weights used when no checkpoint is given.
const DEMO_WEIGHTS_SEED: u64 = 0;

#[derive(Parser, Debug)]
#[command(name = "rwkvforge", about = "Constant-memory RWKV text generation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prefill a context once, then sample several independent continuations.
    Generate {
        /// Safetensors checkpoint; random demo weights when omitted.
        #[arg(long)]
        weights: Option<PathBuf>,
        /// HuggingFace tokenizer.json; byte-level tokens when omitted.
        #[arg(long)]
        tokenizer: Option<PathBuf>,
        /// JSON generation config; flags below override its fields.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        trials: Option<usize>,
        #[arg(long)]
        length: Option<usize>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        top_p: Option<f32>,
        #[arg(long)]
        seed: Option<u64>,
        /// Run trials on the rayon pool and print them once finished.
        #[arg(long, default_value_t = false)]
        parallel: bool,
        /// Write a JSON report of the run.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the geometry and parameter count of a checkpoint as JSON.
    Inspect {
        #[arg(long)]
        weights: PathBuf,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    let _ = tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();

    match cli.command {
        Command::Generate {
            weights,
            tokenizer,
            config,
            context,
            trials,
            length,
            temperature,
            top_p,
            seed,
            parallel,
            report,
        } => {
            let mut generation = match config {
                Some(path) => GenerationConfig::load_from_file(&path)?,
                None => GenerationConfig::default(),
            };
            if let Some(context) = context {
                generation.context = context;
            }
            if let Some(trials) = trials {
                generation.num_trials = trials;
            }
            if let Some(length) = length {
                generation.length_per_trial = length;
            }
            if let Some(temperature) = temperature {
                generation.temperature = temperature;
            }
            if let Some(top_p) = top_p {
                generation.top_p = top_p;
            }
            if seed.is_some() {
                generation.seed = seed;
            }
            generation.parallel_trials |= parallel;

            let model = load_model(weights)?;
            let codec = load_codec(tokenizer, model.config())?;

            let session = GenerationSession::new(&model, codec.as_ref(), generation);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let run_report = session.run(&mut out)?;

            if let Some(path) = report {
                run_report.save_to_file(&path)?;
                info!(path = %path.display(), "generation report written");
            }
        }
        Command::Inspect { weights } => {
            let weight_set = WeightSet::load_safetensors(&weights)
                .with_context(|| format!("failed to load {}", weights.display()))?;
            println!("{}", serde_json::to_string_pretty(&inspect_summary(&weight_set))?);
        }
    }
    Ok(())
}

fn load_model(weights: Option<PathBuf>) -> Result<RwkvModel> {
    let weight_set = match weights {
        Some(path) => {
            info!(path = %path.display(), "loading weights from safetensors");
            WeightSet::load_safetensors(&path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => {
            info!("using random weights (not pretrained)");
            WeightSet::random(&ModelConfig::demo(), DEMO_WEIGHTS_SEED)
        }
    };
    Ok(RwkvModel::new(weight_set))
}

fn load_codec(tokenizer: Option<PathBuf>, config: &ModelConfig) -> Result<Box<dyn TokenCodec>> {
    match tokenizer {
        Some(path) => {
            let tokenizer = TextTokenizer::from_file(&path)?;
            if tokenizer.vocab_size() > config.vocab_size {
                warn!(
                    tokenizer_vocab = tokenizer.vocab_size(),
                    model_vocab = config.vocab_size,
                    "tokenizer vocabulary is larger than the model's"
                );
            }
            Ok(Box::new(tokenizer))
        }
        None => {
            if config.vocab_size < 256 {
                bail!(
                    "--tokenizer is required: model vocabulary of {} cannot hold byte tokens",
                    config.vocab_size
                );
            }
            Ok(Box::new(ByteTokenizer))
        }
    }
}

pub fn inspect_summary(weights: &WeightSet) -> serde_json::Value {
    let config = ModelConfig::from_weights(weights);
    let state_bytes = config.state_rows() * config.n_embd * std::mem::size_of::<f32>();
    serde_json::json!({
        "config": config,
        "parameter_count": weights.parameter_count(),
        "source_dtype": weights.source_dtype,
        "state_bytes": state_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generate_flags() {
        let cli = Cli::parse_from([
            "rwkvforge",
            "generate",
            "--context",
            "Hi",
            "--trials",
            "2",
            "--top-p",
            "0.5",
            "--parallel",
        ]);
        match cli.command {
            Command::Generate {
                context,
                trials,
                top_p,
                parallel,
                weights,
                ..
            } => {
                assert_eq!(context.as_deref(), Some("Hi"));
                assert_eq!(trials, Some(2));
                assert_eq!(top_p, Some(0.5));
                assert!(parallel);
                assert!(weights.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn byte_codec_needs_a_byte_sized_vocabulary() {
        assert!(load_codec(None, &ModelConfig::toy()).is_err());
        assert!(load_codec(None, &ModelConfig::demo()).is_ok());
    }

    #[test]
    fn inspect_reports_geometry() {
        let weights = WeightSet::random(&ModelConfig::toy(), 5);
        let summary = inspect_summary(&weights);
        assert_eq!(summary["config"]["n_layers"], 2);
        assert_eq!(summary["config"]["vocab_size"], 16);
        assert_eq!(summary["state_bytes"], 2 * 5 * 4 * 4);
        assert_eq!(summary["source_dtype"], "F32");
    }
}
