//! Channel mixing: the recurrent feed-forward block.

use crate::state::{RecurrentState, Slot};
use crate::weights::FeedForwardWeights;
use ndarray::{Array1, ArrayView1, Zip};
use rwkvforge_kernels::{matvec, relu_squared_inplace, sigmoid_inplace};

/// Blends the current and previous input, gates the squared-ReLU projection
/// with a sigmoid receptance and records `x` as the next step's previous input.
///
/// `x` must already be layer-normalized.
pub fn channel_mixing(
    x: ArrayView1<'_, f32>,
    state: &mut RecurrentState,
    layer: usize,
    weights: &FeedForwardWeights,
) -> Array1<f32> {
    let (xk, xr) = {
        let prev = state.slot(layer, Slot::ChannelPrev);
        (
            interpolate(x, prev, weights.time_mix_k.view()),
            interpolate(x, prev, weights.time_mix_r.view()),
        )
    };
    state.slot_mut(layer, Slot::ChannelPrev).assign(&x);

    let mut r = matvec(weights.receptance.view(), xr.view());
    sigmoid_inplace(r.view_mut());

    let mut k = matvec(weights.key.view(), xk.view());
    relu_squared_inplace(k.view_mut());

    r * matvec(weights.value.view(), k.view())
}

/// `x * mix + prev * (1 - mix)`, element-wise.
pub(crate) fn interpolate(
    x: ArrayView1<'_, f32>,
    prev: ArrayView1<'_, f32>,
    mix: ArrayView1<'_, f32>,
) -> Array1<f32> {
    Zip::from(&x)
        .and(&prev)
        .and(&mix)
        .map_collect(|&x, &p, &m| x * m + p * (1.0 - m))
}
