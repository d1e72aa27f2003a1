//! Recurrent state carried between tokens.
//!
//! Unlike a KV-cache, the state never grows: each layer owns five vectors of
//! width `n_embd`, rewritten in place on every step. Cloning the state forks an
//! independent continuation.

use ndarray::{Array2, ArrayView1, ArrayViewMut1};

pub const SLOTS_PER_LAYER: usize = 5;

/// Starting value of the log-scale slot. Acts as -inf so the first
/// stabilized exponential contributes ~0.
pub const LOG_SCALE_SENTINEL: f32 = -1e30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Previous input to channel mixing.
    ChannelPrev = 0,
    /// Previous input to time mixing.
    TimePrev = 1,
    /// Running numerator (`aa`).
    Numerator = 2,
    /// Running denominator (`bb`).
    Denominator = 3,
    /// Running log-scale (`pp`).
    LogScale = 4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentState {
    /// (n_layers * 5, n_embd)
    rows: Array2<f32>,
    n_layers: usize,
}

impl RecurrentState {
    pub fn new(n_layers: usize, n_embd: usize) -> Self {
        let mut rows = Array2::<f32>::zeros((n_layers * SLOTS_PER_LAYER, n_embd));
        for layer in 0..n_layers {
            rows.row_mut(layer * SLOTS_PER_LAYER + Slot::LogScale as usize)
                .fill(LOG_SCALE_SENTINEL);
        }
        Self { rows, n_layers }
    }

    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    pub fn n_embd(&self) -> usize {
        self.rows.ncols()
    }

    fn row_index(&self, layer: usize, slot: Slot) -> usize {
        assert!(
            layer < self.n_layers,
            "layer {} out of range for state with {} layers",
            layer,
            self.n_layers
        );
        layer * SLOTS_PER_LAYER + slot as usize
    }

    pub fn slot(&self, layer: usize, slot: Slot) -> ArrayView1<'_, f32> {
        self.rows.row(self.row_index(layer, slot))
    }

    pub fn slot_mut(&mut self, layer: usize, slot: Slot) -> ArrayViewMut1<'_, f32> {
        let index = self.row_index(layer, slot);
        self.rows.row_mut(index)
    }

    /// The whole (n_layers * 5, n_embd) buffer.
    pub fn as_array(&self) -> &Array2<f32> {
        &self.rows
    }

    pub fn is_finite(&self) -> bool {
        self.rows.iter().all(|x| x.is_finite())
    }

    /// Memory held by the state; constant for the life of a sequence.
    pub fn bytes(&self) -> usize {
        self.rows.len() * std::mem::size_of::<f32>()
    }
}
