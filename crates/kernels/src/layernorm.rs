//! Layer normalization kernels.

use ndarray::{Array1, ArrayView1, ArrayViewMut1};

/// Default epsilon, matching the usual framework default for layer norm.
pub const LAYER_NORM_EPS: f32 = 1e-5;

/// Normalizes `data` to zero mean and unit (biased) variance, then applies the
/// optional affine scale and shift.
///
/// # Panics
///
/// Panics if `gamma` or `beta` differ in length from `data`.
pub fn layer_norm_inplace(
    mut data: ArrayViewMut1<'_, f32>,
    gamma: Option<ArrayView1<'_, f32>>,
    beta: Option<ArrayView1<'_, f32>>,
    epsilon: f32,
) {
    let feature_dim = data.len();
    if let Some(gamma) = &gamma {
        assert_eq!(
            gamma.len(),
            feature_dim,
            "gamma length {} must equal feature dimension {}",
            gamma.len(),
            feature_dim
        );
    }
    if let Some(beta) = &beta {
        assert_eq!(
            beta.len(),
            feature_dim,
            "beta length {} must equal feature dimension {}",
            beta.len(),
            feature_dim
        );
    }

    let len = feature_dim as f32;
    let mean = data.iter().sum::<f32>() / len;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / len;
    let inv_std = 1.0 / (var + epsilon).sqrt();

    for (idx, value) in data.iter_mut().enumerate() {
        let mut normalized = (*value - mean) * inv_std;
        if let Some(gamma) = &gamma {
            normalized *= gamma[idx];
        }
        if let Some(beta) = &beta {
            normalized += beta[idx];
        }
        *value = normalized;
    }
}

/// Non-mutating layer norm that returns a new vector.
pub fn layer_norm(
    data: ArrayView1<'_, f32>,
    gamma: ArrayView1<'_, f32>,
    beta: ArrayView1<'_, f32>,
    epsilon: f32,
) -> Array1<f32> {
    let mut output = data.to_owned();
    layer_norm_inplace(output.view_mut(), Some(gamma), Some(beta), epsilon);
    output
}
