//! Time mixing: the linear-attention recurrence.
//!
//! Keeps a running, exponentially decayed weighted average of past values
//! without storing history. The numerator `aa` and denominator `bb` are kept
//! scaled by `exp(-pp)`, and every exponential is taken against the running
//! maximum so its argument is never positive.

use crate::channel_mix::interpolate;
use crate::state::{RecurrentState, Slot};
use crate::weights::AttentionWeights;
use ndarray::{Array1, ArrayView1};
use rwkvforge_kernels::{matvec, sigmoid_inplace};

/// Per-channel result of one stabilized recurrence update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WkvStep {
    /// Output of the weighted average for this step (`a / b`).
    pub wkv: f32,
    pub aa: f32,
    pub bb: f32,
    pub pp: f32,
}

/// One channel of the recurrence.
///
/// The current token is weighted by `exp(time_first + k)` in the output but
/// enters the accumulators with weight `exp(k)`; the history decays by
/// `exp(time_decay)` per step.
#[inline]
pub fn wkv_update(
    aa: f32,
    bb: f32,
    pp: f32,
    k: f32,
    v: f32,
    time_first: f32,
    time_decay: f32,
) -> WkvStep {
    let ww = time_first + k;
    let qq = pp.max(ww);
    let e1 = (pp - qq).exp();
    let e2 = (ww - qq).exp();
    let a = e1 * aa + e2 * v;
    let b = e1 * bb + e2;
    let wkv = a / b;

    let ww = pp + time_decay;
    let qq = ww.max(k);
    let e1 = (ww - qq).exp();
    let e2 = (k - qq).exp();

    WkvStep {
        wkv,
        aa: e1 * aa + e2 * v,
        bb: e1 * bb + e2,
        pp: qq,
    }
}

/// Runs the time-mixing block for `layer`, rewriting its previous-input,
/// numerator, denominator and log-scale slots.
///
/// `x` must already be layer-normalized.
pub fn time_mixing(
    x: ArrayView1<'_, f32>,
    state: &mut RecurrentState,
    layer: usize,
    weights: &AttentionWeights,
) -> Array1<f32> {
    let (xk, xv, xr) = {
        let prev = state.slot(layer, Slot::TimePrev);
        (
            interpolate(x, prev, weights.time_mix_k.view()),
            interpolate(x, prev, weights.time_mix_v.view()),
            interpolate(x, prev, weights.time_mix_r.view()),
        )
    };
    state.slot_mut(layer, Slot::TimePrev).assign(&x);

    let mut r = matvec(weights.receptance.view(), xr.view());
    sigmoid_inplace(r.view_mut());
    let k = matvec(weights.key.view(), xk.view());
    let v = matvec(weights.value.view(), xv.view());

    let n = x.len();
    let mut wkv = Array1::<f32>::zeros(n);
    let mut aa = state.slot(layer, Slot::Numerator).to_owned();
    let mut bb = state.slot(layer, Slot::Denominator).to_owned();
    let mut pp = state.slot(layer, Slot::LogScale).to_owned();

    for i in 0..n {
        let step = wkv_update(
            aa[i],
            bb[i],
            pp[i],
            k[i],
            v[i],
            weights.time_first[i],
            weights.time_decay[i],
        );
        wkv[i] = step.wkv;
        aa[i] = step.aa;
        bb[i] = step.bb;
        pp[i] = step.pp;
    }

    state.slot_mut(layer, Slot::Numerator).assign(&aa);
    state.slot_mut(layer, Slot::Denominator).assign(&bb);
    state.slot_mut(layer, Slot::LogScale).assign(&pp);

    matvec(weights.output.view(), (r * wkv).view())
}
