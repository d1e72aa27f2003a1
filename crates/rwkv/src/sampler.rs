//! Temperature + nucleus (top-p) sampling over output logits.

use crate::error::SamplerError;
use ndarray::{Array1, ArrayView1};
use rwkvforge_kernels::softmax;

/// Draws token ids from logits. Owns its random source so runs can be
/// reproduced from a seed.
pub struct Sampler {
    rng: fastrand::Rng,
}

impl Sampler {
    /// Seeded when `seed` is given, otherwise seeded from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self { rng }
    }

    pub fn with_rng(rng: fastrand::Rng) -> Self {
        Self { rng }
    }

    pub fn draw(
        &mut self,
        logits: ArrayView1<'_, f32>,
        temperature: f32,
        top_p: f32,
    ) -> Result<usize, SamplerError> {
        let probs = nucleus_probs(logits, temperature, top_p)?;
        categorical(&probs, self.rng.f32()).ok_or(SamplerError::EmptyDistribution)
    }
}

/// Distribution actually sampled by [`Sampler::draw`]: softmax, drop every
/// probability below the nucleus cutoff, apply temperature, renormalize.
///
/// Truncation happens before tempering, so the temperature only reshapes the
/// surviving tokens.
pub fn nucleus_probs(
    logits: ArrayView1<'_, f32>,
    temperature: f32,
    top_p: f32,
) -> Result<Array1<f32>, SamplerError> {
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(SamplerError::InvalidParameter {
            name: "temperature",
            value: temperature,
        });
    }
    if !(top_p > 0.0 && top_p <= 1.0) {
        return Err(SamplerError::InvalidParameter {
            name: "top_p",
            value: top_p,
        });
    }
    assert!(!logits.is_empty(), "cannot sample from empty logits");

    let mut probs = softmax(logits);

    let mut sorted: Vec<f32> = probs.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let mut cumulative = 0.0f32;
    // Rounding can keep the running sum at or below 1.0; then nothing is cut.
    let cutoff = sorted
        .iter()
        .find(|&&p| {
            cumulative += p;
            cumulative > top_p
        })
        .or_else(|| sorted.last())
        .copied()
        .unwrap_or(0.0);

    probs.mapv_inplace(|p| if p < cutoff { 0.0 } else { p });
    if temperature != 1.0 {
        // Tempered relative to the top survivor, which stays at 1.0 and keeps
        // the sum positive when small temperatures underflow the rest.
        let exponent = 1.0 / temperature;
        let max = probs.iter().copied().fold(0.0f32, f32::max);
        if max > 0.0 {
            probs.mapv_inplace(|p| (p / max).powf(exponent));
        }
    }
    let sum = probs.sum();
    if sum > 0.0 {
        probs /= sum;
    }
    Ok(probs)
}

/// Inverse-CDF draw; `uniform` is in [0, 1). Only indices with positive
/// probability are ever returned; `None` when there are none.
fn categorical(probs: &Array1<f32>, uniform: f32) -> Option<usize> {
    let total: f32 = probs.iter().filter(|&&p| p > 0.0).sum();
    let target = uniform * total;
    let mut cumulative = 0.0f32;
    let mut last_positive = None;
    for (idx, &p) in probs.iter().enumerate() {
        // Also skips NaN.
        if !(p > 0.0) {
            continue;
        }
        cumulative += p;
        last_positive = Some(idx);
        if target < cumulative {
            return Some(idx);
        }
    }
    last_positive
}
