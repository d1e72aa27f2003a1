//! Shared element-wise helpers.

use ndarray::{Array1, ArrayView1, ArrayView2, ArrayViewMut1};

/// # Panics
///
/// Panics when the matrix column count differs from the vector length.
pub fn validate_matvec_inputs(matrix: &ArrayView2<'_, f32>, vector: &ArrayView1<'_, f32>) {
    assert!(
        matrix.ncols() == vector.len(),
        "matvec dimension mismatch: matrix {}x{} vs vector {}",
        matrix.nrows(),
        matrix.ncols(),
        vector.len()
    );
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn sigmoid_inplace(mut data: ArrayViewMut1<'_, f32>) {
    data.mapv_inplace(sigmoid);
}

/// `relu(x)^2`, the channel-mixing activation.
pub fn relu_squared_inplace(mut data: ArrayViewMut1<'_, f32>) {
    data.mapv_inplace(|x| {
        let r = x.max(0.0);
        r * r
    });
}

/// Max-subtracted softmax over a whole vector.
pub fn softmax(logits: ArrayView1<'_, f32>) -> Array1<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut probs = logits.mapv(|x| (x - max).exp());
    let sum = probs.sum();
    probs /= sum.max(f32::EPSILON);
    probs
}
