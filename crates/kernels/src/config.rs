//! Tensor precision descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Precision a tensor was stored with before being widened to `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    F32,
    F16,
    BF16,
    F64,
}

impl DataType {
    pub fn element_size_bytes(&self) -> usize {
        match self {
            DataType::F64 => 8,
            DataType::F32 => 4,
            DataType::F16 | DataType::BF16 => 2,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::F32 => "f32",
            DataType::F16 => "f16",
            DataType::BF16 => "bf16",
            DataType::F64 => "f64",
        };
        f.write_str(name)
    }
}
