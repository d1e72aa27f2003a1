//! Matrix·vector kernels.
//!
//! Every projection in the recurrent model multiplies a weight matrix stored
//! as (out_features, in_features) with a single input vector. Each output
//! element is one row dot product, computed the same way by every kernel so
//! sequential and parallel execution agree bit for bit.

use crate::utils::validate_matvec_inputs;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Row count from which [`matvec`] hands the product to [`ParallelMatvec`].
pub const PARALLEL_ROW_THRESHOLD: usize = 4096;

pub trait MatvecKernel: Send + Sync {
    fn supports(&self, rows: usize, cols: usize) -> bool;
    fn run(&self, matrix: ArrayView2<'_, f32>, vector: ArrayView1<'_, f32>) -> Array1<f32>;
}

#[derive(Default)]
pub struct ReferenceMatvec;

impl ReferenceMatvec {
    pub fn new() -> Self {
        Self
    }
}

impl MatvecKernel for ReferenceMatvec {
    fn supports(&self, _rows: usize, _cols: usize) -> bool {
        true
    }

    fn run(&self, matrix: ArrayView2<'_, f32>, vector: ArrayView1<'_, f32>) -> Array1<f32> {
        validate_matvec_inputs(&matrix, &vector);
        matrix
            .axis_iter(Axis(0))
            .map(|row| row.dot(&vector))
            .collect()
    }
}

/// Splits output rows across the rayon pool.
pub struct ParallelMatvec {
    min_rows: usize,
}

impl ParallelMatvec {
    pub fn new() -> Self {
        Self {
            min_rows: PARALLEL_ROW_THRESHOLD,
        }
    }

    pub fn with_min_rows(min_rows: usize) -> Self {
        Self { min_rows }
    }
}

impl Default for ParallelMatvec {
    fn default() -> Self {
        Self::new()
    }
}

impl MatvecKernel for ParallelMatvec {
    fn supports(&self, rows: usize, _cols: usize) -> bool {
        rows >= self.min_rows
    }

    fn run(&self, matrix: ArrayView2<'_, f32>, vector: ArrayView1<'_, f32>) -> Array1<f32> {
        validate_matvec_inputs(&matrix, &vector);
        let output: Vec<f32> = matrix
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| row.dot(&vector))
            .collect();
        Array1::from_vec(output)
    }
}

/// Computes `matrix · vector`, picking the parallel kernel for tall matrices
/// such as the vocabulary head.
///
/// # Panics
///
/// Panics if `matrix.ncols() != vector.len()`.
pub fn matvec(matrix: ArrayView2<'_, f32>, vector: ArrayView1<'_, f32>) -> Array1<f32> {
    let parallel = ParallelMatvec::new();
    if parallel.supports(matrix.nrows(), matrix.ncols()) {
        parallel.run(matrix, vector)
    } else {
        ReferenceMatvec::new().run(matrix, vector)
    }
}
