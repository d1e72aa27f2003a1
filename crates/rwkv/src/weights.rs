//! Weight structures and safetensors loader.
//!
//! Checkpoints are a flat mapping from dotted names (`blocks.3.att.time_first`)
//! to tensors. Names are resolved through a fixed dispatch table into the
//! per-layer records below; nothing is looked up by string after loading.

use crate::config::ModelConfig;
use crate::error::LoadError;
use ndarray::{Array1, Array2};
use rwkvforge_kernels::DataType;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct LayerNormWeights {
    pub weight: Array1<f32>,
    pub bias: Array1<f32>,
}

/// Time-mixing parameters (`blocks.N.att.*`).
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionWeights {
    pub time_mix_k: Array1<f32>,
    pub time_mix_v: Array1<f32>,
    pub time_mix_r: Array1<f32>,
    pub time_first: Array1<f32>,
    /// Stored as `-exp(raw)`, so always <= 0.
    pub time_decay: Array1<f32>,
    pub key: Array2<f32>,
    pub value: Array2<f32>,
    pub receptance: Array2<f32>,
    pub output: Array2<f32>,
}

/// Channel-mixing parameters (`blocks.N.ffn.*`).
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardWeights {
    pub time_mix_k: Array1<f32>,
    pub time_mix_r: Array1<f32>,
    /// (ffn_dim, n_embd)
    pub key: Array2<f32>,
    /// (n_embd, ffn_dim)
    pub value: Array2<f32>,
    pub receptance: Array2<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerWeights {
    /// Applied before time mixing.
    pub ln1: LayerNormWeights,
    /// Applied before channel mixing.
    pub ln2: LayerNormWeights,
    pub att: AttentionWeights,
    pub ffn: FeedForwardWeights,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightSet {
    pub emb: Array2<f32>, // (vocab_size, n_embd)
    /// `blocks.0.ln0`, applied once to the embedding.
    pub ln0: LayerNormWeights,
    pub layers: Vec<LayerWeights>,
    pub ln_out: LayerNormWeights,
    pub head: Array2<f32>, // (vocab_size, n_embd)
    /// Precision the embedding was stored with before widening to f32.
    pub source_dtype: DataType,
}

/// One named tensor already widened to f32, as handed over by a container
/// reader.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
    pub dtype: DataType,
}

impl RawTensor {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            shape,
            data,
            dtype: DataType::F32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BlockField {
    Ln0Weight,
    Ln0Bias,
    Ln1Weight,
    Ln1Bias,
    Ln2Weight,
    Ln2Bias,
    AttTimeMixK,
    AttTimeMixV,
    AttTimeMixR,
    AttTimeFirst,
    AttTimeDecay,
    AttKey,
    AttValue,
    AttReceptance,
    AttOutput,
    FfnTimeMixK,
    FfnTimeMixR,
    FfnKey,
    FfnValue,
    FfnReceptance,
}

const BLOCK_FIELDS: [(&str, BlockField); 20] = [
    ("ln0.weight", BlockField::Ln0Weight),
    ("ln0.bias", BlockField::Ln0Bias),
    ("ln1.weight", BlockField::Ln1Weight),
    ("ln1.bias", BlockField::Ln1Bias),
    ("ln2.weight", BlockField::Ln2Weight),
    ("ln2.bias", BlockField::Ln2Bias),
    ("att.time_mix_k", BlockField::AttTimeMixK),
    ("att.time_mix_v", BlockField::AttTimeMixV),
    ("att.time_mix_r", BlockField::AttTimeMixR),
    ("att.time_first", BlockField::AttTimeFirst),
    ("att.time_decay", BlockField::AttTimeDecay),
    ("att.key.weight", BlockField::AttKey),
    ("att.value.weight", BlockField::AttValue),
    ("att.receptance.weight", BlockField::AttReceptance),
    ("att.output.weight", BlockField::AttOutput),
    ("ffn.time_mix_k", BlockField::FfnTimeMixK),
    ("ffn.time_mix_r", BlockField::FfnTimeMixR),
    ("ffn.key.weight", BlockField::FfnKey),
    ("ffn.value.weight", BlockField::FfnValue),
    ("ffn.receptance.weight", BlockField::FfnReceptance),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TensorSlot {
    Embedding,
    Head,
    LnOutWeight,
    LnOutBias,
    Block(usize, BlockField),
}

fn resolve_name(name: &str) -> Option<TensorSlot> {
    match name {
        "emb.weight" => Some(TensorSlot::Embedding),
        "head.weight" => Some(TensorSlot::Head),
        "ln_out.weight" => Some(TensorSlot::LnOutWeight),
        "ln_out.bias" => Some(TensorSlot::LnOutBias),
        _ => {
            let rest = name.strip_prefix("blocks.")?;
            let (index, field) = rest.split_once('.')?;
            let index: usize = index.parse().ok()?;
            let field = BLOCK_FIELDS
                .iter()
                .find(|(suffix, _)| *suffix == field)
                .map(|(_, field)| *field)?;
            if matches!(field, BlockField::Ln0Weight | BlockField::Ln0Bias) && index != 0 {
                return None;
            }
            Some(TensorSlot::Block(index, field))
        }
    }
}

fn slot_name(slot: TensorSlot) -> String {
    match slot {
        TensorSlot::Embedding => "emb.weight".to_string(),
        TensorSlot::Head => "head.weight".to_string(),
        TensorSlot::LnOutWeight => "ln_out.weight".to_string(),
        TensorSlot::LnOutBias => "ln_out.bias".to_string(),
        TensorSlot::Block(index, field) => {
            let suffix = BLOCK_FIELDS
                .iter()
                .find(|(_, f)| *f == field)
                .map(|(suffix, _)| *suffix)
                .unwrap_or("?");
            format!("blocks.{}.{}", index, suffix)
        }
    }
}

/// Collapses a `time_*` tensor stored as e.g. (1, 1, n_embd) to rank 1 and
/// moves `time_decay` into the log domain.
fn apply_load_transforms(mut tensor: RawTensor) -> Result<RawTensor, LoadError> {
    let expected: usize = tensor.shape.iter().product();
    if tensor.data.len() != expected {
        return Err(LoadError::ShapeMismatch {
            name: tensor.name,
            expected: tensor.shape,
            actual: vec![tensor.data.len()],
        });
    }
    if tensor.name.contains(".time_") {
        let non_unit: Vec<usize> = tensor.shape.iter().copied().filter(|&d| d != 1).collect();
        tensor.shape = match non_unit.len() {
            0 => vec![1],
            1 => non_unit,
            _ => {
                return Err(LoadError::UnsupportedRank {
                    name: tensor.name,
                    rank: tensor.shape.len(),
                })
            }
        };
    }
    if tensor.name.contains(".time_decay") {
        tensor.data.iter_mut().for_each(|x| *x = -x.exp());
    }
    Ok(tensor)
}

struct TensorTable {
    tensors: BTreeMap<TensorSlot, RawTensor>,
}

impl TensorTable {
    fn take(&mut self, slot: TensorSlot) -> Result<RawTensor, LoadError> {
        self.tensors
            .remove(&slot)
            .ok_or_else(|| LoadError::MissingTensor(slot_name(slot)))
    }

    fn vector(&mut self, slot: TensorSlot, len: usize) -> Result<Array1<f32>, LoadError> {
        let tensor = self.take(slot)?;
        if tensor.shape.len() != 1 {
            return Err(LoadError::UnsupportedRank {
                name: tensor.name,
                rank: tensor.shape.len(),
            });
        }
        if tensor.shape[0] != len {
            return Err(LoadError::ShapeMismatch {
                name: tensor.name,
                expected: vec![len],
                actual: tensor.shape,
            });
        }
        Ok(Array1::from_vec(tensor.data))
    }

    fn matrix(
        &mut self,
        slot: TensorSlot,
        rows: Option<usize>,
        cols: usize,
    ) -> Result<Array2<f32>, LoadError> {
        let tensor = self.take(slot)?;
        matrix_from_raw(tensor, rows, cols)
    }

    fn layer_norm(
        &mut self,
        weight: TensorSlot,
        bias: TensorSlot,
        n_embd: usize,
    ) -> Result<LayerNormWeights, LoadError> {
        Ok(LayerNormWeights {
            weight: self.vector(weight, n_embd)?,
            bias: self.vector(bias, n_embd)?,
        })
    }
}

fn matrix_from_raw(
    tensor: RawTensor,
    rows: Option<usize>,
    cols: usize,
) -> Result<Array2<f32>, LoadError> {
    if tensor.shape.len() != 2 {
        return Err(LoadError::UnsupportedRank {
            name: tensor.name,
            rank: tensor.shape.len(),
        });
    }
    let (r, c) = (tensor.shape[0], tensor.shape[1]);
    if rows.map_or(false, |rows| rows != r) || c != cols {
        return Err(LoadError::ShapeMismatch {
            name: tensor.name,
            expected: vec![rows.unwrap_or(r), cols],
            actual: tensor.shape,
        });
    }
    Array2::from_shape_vec((r, c), tensor.data).map_err(|e| LoadError::ShapeMismatch {
        name: format!("{} ({})", tensor.name, e),
        expected: vec![r, c],
        actual: vec![r * c],
    })
}

impl WeightSet {
    /// Load weights from a safetensors file.
    pub fn load_safetensors(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), bytes = data.len(), "loading safetensors weights");
        Self::load_safetensors_bytes(&data)
    }

    pub fn load_safetensors_bytes(data: &[u8]) -> Result<Self, LoadError> {
        let tensors = SafeTensors::deserialize(data)?;
        let raw = tensors
            .tensors()
            .into_iter()
            .map(|(name, view)| decode_tensor(name, &view))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_tensors(raw)
    }

    /// Builds the weight set from a logical name→tensor mapping, applying the
    /// `time_*` squeeze and `time_decay` transform on the way in.
    pub fn from_tensors<I>(tensors: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = RawTensor>,
    {
        let mut table = TensorTable {
            tensors: BTreeMap::new(),
        };
        for tensor in tensors {
            let tensor = apply_load_transforms(tensor)?;
            match resolve_name(&tensor.name) {
                Some(slot) => {
                    table.tensors.insert(slot, tensor);
                }
                None => debug!(name = %tensor.name, "ignoring unrecognized tensor"),
            }
        }

        let n_layers = table
            .tensors
            .keys()
            .filter_map(|slot| match slot {
                TensorSlot::Block(index, _) => Some(index + 1),
                _ => None,
            })
            .max()
            .ok_or(LoadError::EmptyModel)?;

        let emb_raw = table.take(TensorSlot::Embedding)?;
        if emb_raw.shape.len() != 2 {
            return Err(LoadError::UnsupportedRank {
                name: emb_raw.name,
                rank: emb_raw.shape.len(),
            });
        }
        let (vocab_size, n_embd) = (emb_raw.shape[0], emb_raw.shape[1]);
        let source_dtype = emb_raw.dtype;
        let emb = matrix_from_raw(emb_raw, Some(vocab_size), n_embd)?;
        let head = table.matrix(TensorSlot::Head, Some(vocab_size), n_embd)?;
        let ln_out = table.layer_norm(TensorSlot::LnOutWeight, TensorSlot::LnOutBias, n_embd)?;
        let ln0 = table.layer_norm(
            TensorSlot::Block(0, BlockField::Ln0Weight),
            TensorSlot::Block(0, BlockField::Ln0Bias),
            n_embd,
        )?;

        let mut ffn_dim = None;
        let mut layers = Vec::with_capacity(n_layers);
        for i in 0..n_layers {
            let slot = |field| TensorSlot::Block(i, field);

            let ln1 = table.layer_norm(
                slot(BlockField::Ln1Weight),
                slot(BlockField::Ln1Bias),
                n_embd,
            )?;
            let ln2 = table.layer_norm(
                slot(BlockField::Ln2Weight),
                slot(BlockField::Ln2Bias),
                n_embd,
            )?;

            let att = AttentionWeights {
                time_mix_k: table.vector(slot(BlockField::AttTimeMixK), n_embd)?,
                time_mix_v: table.vector(slot(BlockField::AttTimeMixV), n_embd)?,
                time_mix_r: table.vector(slot(BlockField::AttTimeMixR), n_embd)?,
                time_first: table.vector(slot(BlockField::AttTimeFirst), n_embd)?,
                time_decay: table.vector(slot(BlockField::AttTimeDecay), n_embd)?,
                key: table.matrix(slot(BlockField::AttKey), Some(n_embd), n_embd)?,
                value: table.matrix(slot(BlockField::AttValue), Some(n_embd), n_embd)?,
                receptance: table.matrix(slot(BlockField::AttReceptance), Some(n_embd), n_embd)?,
                output: table.matrix(slot(BlockField::AttOutput), Some(n_embd), n_embd)?,
            };

            // The first layer fixes the channel-mixing width for the rest.
            let ffn_key = table.matrix(slot(BlockField::FfnKey), ffn_dim, n_embd)?;
            let hidden = *ffn_dim.get_or_insert(ffn_key.nrows());
            let ffn = FeedForwardWeights {
                time_mix_k: table.vector(slot(BlockField::FfnTimeMixK), n_embd)?,
                time_mix_r: table.vector(slot(BlockField::FfnTimeMixR), n_embd)?,
                key: ffn_key,
                value: table.matrix(slot(BlockField::FfnValue), Some(n_embd), hidden)?,
                receptance: table.matrix(slot(BlockField::FfnReceptance), Some(n_embd), n_embd)?,
            };

            layers.push(LayerWeights { ln1, ln2, att, ffn });
        }

        info!(
            layers = n_layers,
            n_embd,
            vocab_size,
            ffn_dim = ffn_dim.unwrap_or(0),
            dtype = %source_dtype,
            "weights loaded"
        );

        Ok(Self {
            emb,
            ln0,
            layers,
            ln_out,
            head,
            source_dtype,
        })
    }

    /// Deterministic small random weights for smoke tests and demos (not for
    /// real inference). Goes through the same name dispatch as a checkpoint.
    ///
    /// Panics if `config` has no layers.
    pub fn random(config: &ModelConfig, seed: u64) -> Self {
        assert!(config.n_layers > 0, "random weights need at least one layer");
        let mut rng = fastrand::Rng::with_seed(seed);
        let tensors = random_tensors(config, &mut rng);
        Self::from_tensors(tensors).unwrap_or_else(|e| {
            unreachable!("generated tensors always match their own config: {}", e)
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.emb.nrows()
    }

    pub fn n_embd(&self) -> usize {
        self.emb.ncols()
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn ffn_dim(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.ffn.key.nrows())
    }

    pub fn parameter_count(&self) -> usize {
        let ln = |ln: &LayerNormWeights| ln.weight.len() + ln.bias.len();
        let per_layer: usize = self
            .layers
            .iter()
            .map(|layer| {
                let att = &layer.att;
                let ffn = &layer.ffn;
                ln(&layer.ln1)
                    + ln(&layer.ln2)
                    + att.time_mix_k.len()
                    + att.time_mix_v.len()
                    + att.time_mix_r.len()
                    + att.time_first.len()
                    + att.time_decay.len()
                    + att.key.len()
                    + att.value.len()
                    + att.receptance.len()
                    + att.output.len()
                    + ffn.time_mix_k.len()
                    + ffn.time_mix_r.len()
                    + ffn.key.len()
                    + ffn.value.len()
                    + ffn.receptance.len()
            })
            .sum();
        self.emb.len() + self.head.len() + ln(&self.ln0) + ln(&self.ln_out) + per_layer
    }
}

fn decode_tensor(name: String, view: &TensorView<'_>) -> Result<RawTensor, LoadError> {
    let bytes = view.data();
    let (dtype, data): (DataType, Vec<f32>) = match view.dtype() {
        Dtype::F32 => (
            DataType::F32,
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        Dtype::F16 => (
            DataType::F16,
            bytes
                .chunks_exact(2)
                .map(|c| half::f16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
                .collect(),
        ),
        Dtype::BF16 => (
            DataType::BF16,
            bytes
                .chunks_exact(2)
                .map(|c| half::bf16::from_bits(u16::from_le_bytes([c[0], c[1]])).to_f32())
                .collect(),
        ),
        Dtype::F64 => (
            DataType::F64,
            bytes
                .chunks_exact(8)
                .map(|c| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(c);
                    f64::from_le_bytes(raw) as f32
                })
                .collect(),
        ),
        other => {
            return Err(LoadError::UnsupportedDType {
                name,
                dtype: format!("{:?}", other),
            })
        }
    };

    let expected: usize = view.shape().iter().product();
    if data.len() != expected {
        return Err(LoadError::ShapeMismatch {
            name,
            expected: view.shape().to_vec(),
            actual: vec![data.len()],
        });
    }

    Ok(RawTensor {
        name,
        shape: view.shape().to_vec(),
        data,
        dtype,
    })
}

/// Raw tensors for `config`, named and shaped like an RWKV-4 checkpoint
/// (`time_*` vectors stored as (1, 1, n_embd), `time_decay` before `-exp`).
pub fn random_tensors(config: &ModelConfig, rng: &mut fastrand::Rng) -> Vec<RawTensor> {
    let n = config.n_embd;
    let mut uniform = |len: usize, scale: f32| -> Vec<f32> {
        (0..len).map(|_| (rng.f32() - 0.5) * scale).collect()
    };

    let vocab = config.vocab_size;
    let hidden = config.ffn_dim;

    let mut tensors = vec![
        RawTensor::new("emb.weight", vec![vocab, n], uniform(vocab * n, 0.2)),
        RawTensor::new("head.weight", vec![vocab, n], uniform(vocab * n, 0.2)),
        RawTensor::new("ln_out.weight", vec![n], vec![1.0; n]),
        RawTensor::new("ln_out.bias", vec![n], vec![0.0; n]),
        RawTensor::new("blocks.0.ln0.weight", vec![n], vec![1.0; n]),
        RawTensor::new("blocks.0.ln0.bias", vec![n], vec![0.0; n]),
    ];

    for i in 0..config.n_layers {
        let p = |suffix: &str| format!("blocks.{}.{}", i, suffix);
        let mix = |values: Vec<f32>| values.into_iter().map(|x| x + 0.5).collect::<Vec<_>>();
        tensors.extend([
            RawTensor::new(p("ln1.weight"), vec![n], vec![1.0; n]),
            RawTensor::new(p("ln1.bias"), vec![n], vec![0.0; n]),
            RawTensor::new(p("ln2.weight"), vec![n], vec![1.0; n]),
            RawTensor::new(p("ln2.bias"), vec![n], vec![0.0; n]),
            RawTensor::new(p("att.time_mix_k"), vec![1, 1, n], mix(uniform(n, 1.0))),
            RawTensor::new(p("att.time_mix_v"), vec![1, 1, n], mix(uniform(n, 1.0))),
            RawTensor::new(p("att.time_mix_r"), vec![1, 1, n], mix(uniform(n, 1.0))),
            RawTensor::new(p("att.time_first"), vec![n], uniform(n, 1.0)),
            RawTensor::new(p("att.time_decay"), vec![n], uniform(n, 2.0)),
            RawTensor::new(p("att.key.weight"), vec![n, n], uniform(n * n, 0.5)),
            RawTensor::new(p("att.value.weight"), vec![n, n], uniform(n * n, 0.5)),
            RawTensor::new(p("att.receptance.weight"), vec![n, n], uniform(n * n, 0.5)),
            RawTensor::new(p("att.output.weight"), vec![n, n], uniform(n * n, 0.5)),
            RawTensor::new(p("ffn.time_mix_k"), vec![1, 1, n], mix(uniform(n, 1.0))),
            RawTensor::new(p("ffn.time_mix_r"), vec![1, 1, n], mix(uniform(n, 1.0))),
            RawTensor::new(p("ffn.key.weight"), vec![hidden, n], uniform(hidden * n, 0.5)),
            RawTensor::new(p("ffn.value.weight"), vec![n, hidden], uniform(n * hidden, 0.5)),
            RawTensor::new(p("ffn.receptance.weight"), vec![n, n], uniform(n * n, 0.5)),
        ]);
    }
    tensors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_tensors() -> Vec<RawTensor> {
        let mut rng = fastrand::Rng::with_seed(7);
        random_tensors(&ModelConfig::toy(), &mut rng)
    }

    #[test]
    fn resolves_block_names() {
        assert_eq!(
            resolve_name("blocks.3.att.time_first"),
            Some(TensorSlot::Block(3, BlockField::AttTimeFirst))
        );
        assert_eq!(resolve_name("emb.weight"), Some(TensorSlot::Embedding));
        assert_eq!(resolve_name("blocks.1.ln0.weight"), None);
        assert_eq!(resolve_name("blocks.x.att.key.weight"), None);
        assert_eq!(resolve_name("blocks.0.att.rope"), None);
        assert_eq!(
            slot_name(TensorSlot::Block(2, BlockField::FfnValue)),
            "blocks.2.ffn.value.weight"
        );
    }

    #[test]
    fn squeezes_time_tensors_and_transforms_decay() {
        let weights = WeightSet::from_tensors(toy_tensors()).expect("load");
        assert_eq!(weights.n_layers(), 2);
        assert_eq!(weights.n_embd(), 4);
        assert_eq!(weights.vocab_size(), 16);
        for layer in &weights.layers {
            assert_eq!(layer.att.time_mix_k.len(), 4);
            assert!(layer.att.time_decay.iter().all(|&w| w <= 0.0));
        }
    }

    #[test]
    fn loading_twice_is_bit_identical() {
        let a = WeightSet::from_tensors(toy_tensors()).expect("load");
        let b = WeightSet::from_tensors(toy_tensors()).expect("load");
        assert_eq!(a, b);
    }

    #[test]
    fn missing_tensor_is_reported_by_name() {
        let tensors = toy_tensors()
            .into_iter()
            .filter(|t| t.name != "blocks.1.att.output.weight");
        let err = WeightSet::from_tensors(tensors).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingTensor(ref name) if name == "blocks.1.att.output.weight"
        ));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let tensors = toy_tensors().into_iter().map(|mut t| {
            if t.name == "head.weight" {
                t.shape = vec![4, 16];
            }
            t
        });
        let err = WeightSet::from_tensors(tensors).unwrap_err();
        assert!(matches!(err, LoadError::ShapeMismatch { .. }));
    }

    #[test]
    fn data_length_must_match_shape() {
        let tensors = toy_tensors().into_iter().map(|mut t| {
            if t.name == "ln_out.weight" {
                t.data.pop();
            }
            t
        });
        match WeightSet::from_tensors(tensors) {
            Err(LoadError::ShapeMismatch {
                name,
                expected,
                actual,
            }) => {
                assert_eq!(name, "ln_out.weight");
                assert_eq!(expected, vec![4]);
                assert_eq!(actual, vec![3]);
            }
            other => panic!("expected shape mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    #[should_panic(expected = "at least one layer")]
    fn random_weights_need_a_layer() {
        let config = ModelConfig {
            n_layers: 0,
            ..ModelConfig::toy()
        };
        let _ = WeightSet::random(&config, 1);
    }

    #[test]
    fn non_trivial_time_tensor_rank_is_rejected() {
        let tensors = toy_tensors().into_iter().map(|mut t| {
            if t.name == "blocks.0.att.time_first" {
                t.shape = vec![2, 2];
            }
            t
        });
        let err = WeightSet::from_tensors(tensors).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedRank { rank: 2, .. }));
    }

    #[test]
    fn empty_source_is_rejected() {
        let err = WeightSet::from_tensors(Vec::new()).unwrap_err();
        assert!(matches!(err, LoadError::EmptyModel));
    }

    #[test]
    fn unknown_tensors_are_ignored() {
        let mut tensors = toy_tensors();
        tensors.push(RawTensor::new("blocks.0.att.extra", vec![4], vec![0.0; 4]));
        let weights = WeightSet::from_tensors(tensors).expect("load");
        assert_eq!(weights.n_layers(), 2);
    }

    #[test]
    fn parameter_count_matches_geometry() {
        let weights = WeightSet::random(&ModelConfig::toy(), 1);
        // emb + head: 2 * 16 * 4; ln0 + ln_out: 16
        // per layer: 2 ln (16) + 5 att vectors (20) + 4 att matrices (64)
        //          + 2 ffn vectors (8) + 3 ffn matrices (48)
        assert_eq!(weights.parameter_count(), 128 + 16 + 2 * (16 + 20 + 64 + 8 + 48));
    }

    #[test]
    fn decodes_half_precision_safetensors() {
        let values = [half::bf16::from_f32(1.5), half::bf16::from_f32(-2.0)];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_bits().to_le_bytes()).collect();
        let view = TensorView::new(Dtype::BF16, vec![2], &bytes).expect("view");
        let raw = decode_tensor("x".to_string(), &view).expect("decode");
        assert_eq!(raw.data, vec![1.5, -2.0]);
        assert_eq!(raw.dtype, DataType::BF16);
    }
}
