//! Error taxonomy for loading weights, sampling and tokenization.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read weights from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed weight container: {0}")]
    Format(String),

    #[error("tensor '{0}' not found")]
    MissingTensor(String),

    #[error("tensor '{name}' has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("tensor '{name}' has unsupported rank {rank}")]
    UnsupportedRank { name: String, rank: usize },

    #[error("tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDType { name: String, dtype: String },

    #[error("weight source contains no layers")]
    EmptyModel,
}

impl From<safetensors::SafeTensorError> for LoadError {
    fn from(e: safetensors::SafeTensorError) -> Self {
        LoadError::Format(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    #[error("invalid sampler parameter {name} = {value}")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("no token has positive probability; logits may be non-finite")]
    EmptyDistribution,
}

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("failed to load tokenizer from {path}: {message}")]
    Load { path: String, message: String },

    #[error("tokenizer failed: {0}")]
    Codec(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadError::MissingTensor("blocks.0.att.key.weight".to_string());
        assert!(err.to_string().contains("not found"));

        let err = LoadError::ShapeMismatch {
            name: "head.weight".to_string(),
            expected: vec![16, 4],
            actual: vec![4, 16],
        };
        assert!(err.to_string().contains("[16, 4]"));

        let err = SamplerError::InvalidParameter {
            name: "temperature",
            value: 0.0,
        };
        assert!(err.to_string().contains("temperature"));
    }
}
