// Copyright 2021 the tantan-rs authors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! C3, the forward/backward posterior-probability engine (spec §4.3), and
//! the `mask_sequences`/`get_probabilities` external operations (spec §6)
//! built on top of it.

use log::warn;

use crate::model::emission::{apply_emission_prob, EmissionTable};
use crate::model::params::Params;

const RESCALE_PERIOD: usize = 16;

/// The three dense per-position vectors of spec §3 ("Per-position DP
/// vectors"): one background scalar, `W` foreground entries, `W-1`
/// insertion entries (insertion states only exist for `k` in `1..W`).
#[derive(Debug, Clone)]
pub(crate) struct StateVectors {
    pub(crate) bg: f64,
    fg: Vec<f64>,
    ins: Vec<f64>,
}

impl StateVectors {
    fn init_forward(w: usize) -> Self {
        StateVectors {
            bg: 1.0,
            fg: vec![0.0; w],
            ins: vec![0.0; w.saturating_sub(1)],
        }
    }

    /// Terminal values the backward pass starts from: `B = b2b`, every
    /// `F_k = f2b` (spec §4.3, "Initialisation for the backward pass").
    pub(crate) fn init_backward(params: &Params, w: usize) -> Self {
        StateVectors {
            bg: params.b2b(),
            fg: vec![params.f2b(); w],
            ins: vec![0.0; w.saturating_sub(1)],
        }
    }

    pub(crate) fn fg(&self) -> &[f64] {
        &self.fg
    }

    fn forward_total(&self, params: &Params) -> f64 {
        self.bg * params.b2b() + self.fg.iter().sum::<f64>() * params.f2b()
    }

    /// Divide every entry by the current background value; returns the
    /// reciprocal so the caller can record `scale[p/S] = 1/bg` (spec
    /// §4.3, "Rescaling").
    pub(crate) fn rescale_forward(&mut self) -> f64 {
        let inv = 1.0 / self.bg;
        self.bg *= inv;
        for f in self.fg.iter_mut() {
            *f *= inv;
        }
        for i in self.ins.iter_mut() {
            *i *= inv;
        }
        debug_assert!(self.bg > 0.0);
        inv
    }

    pub(crate) fn rescale_backward(&mut self, scale: f64) {
        self.bg *= scale;
        for f in self.fg.iter_mut() {
            *f *= scale;
        }
        for i in self.ins.iter_mut() {
            *i *= scale;
        }
    }

    pub(crate) fn apply_emission(&mut self, emissions: &EmissionTable, seq: &[u8], p: usize) {
        let w = self.fg.len();
        apply_emission_prob(emissions, seq, p, w, &mut self.fg);
    }

    /// Forward transition, gapped branch (spec §4.3, with-gaps recurrence).
    /// Scans periods from `W` down to `1`, carrying a running deletion
    /// accumulator `d` and a growth-scaled background contribution.
    fn forward_transition_with_gaps(&mut self, params: &Params) {
        let w = self.fg.len();
        debug_assert!(w >= 2);

        let b2f_last = params.b2f_last();
        let growth = params.b2f_growth();
        let f2f1 = params.f2f1();
        let f2f2 = params.f2f2();
        let one_gap = params.one_gap_prob();
        let end_gap = params.end_gap_prob();
        let g2g = params.g2g();

        let old_top_f = self.fg[w - 1];
        let old_top_i = self.ins[w - 2];
        let mut from_background = self.bg * b2f_last;
        let mut from_foreground = old_top_f;

        self.fg[w - 1] = from_background + old_top_f * f2f1 + old_top_i * end_gap;
        let mut d = old_top_f;
        from_background *= growth;

        for idx in (1..w - 1).rev() {
            let old_f = self.fg[idx];
            let old_i = self.ins[idx - 1];
            from_foreground += old_f;
            self.fg[idx] = from_background + old_f * f2f2 + (old_i + d) * one_gap;
            self.ins[idx] = old_f + old_i * g2g;
            d = old_f + d * g2g;
            from_background *= growth;
        }

        let old_f0 = self.fg[0];
        from_foreground += old_f0;
        self.fg[0] = from_background + old_f0 * f2f1 + d * end_gap;
        self.ins[0] = old_f0;

        self.bg = self.bg * params.b2b() + from_foreground * params.f2b();
    }

    /// Forward transition, no-gap branch (spec §4.3, "Without gaps").
    fn forward_transition_no_gaps(&mut self, params: &Params) {
        let mut from_background = self.bg * params.b2f_last();
        let growth = params.b2f_growth();
        let f2f0 = params.f2f0();
        let mut from_foreground = 0.0;

        for idx in (0..self.fg.len()).rev() {
            let f = self.fg[idx];
            from_foreground += f;
            self.fg[idx] = from_background + f * f2f0;
            from_background *= growth;
        }

        self.bg = self.bg * params.b2b() + from_foreground * params.f2b();
    }

    fn forward_transition(&mut self, params: &Params) {
        if params.has_gaps() {
            self.forward_transition_with_gaps(params);
        } else {
            self.forward_transition_no_gaps(params);
        }
    }

    /// Backward transition, gapped branch: the time-reverse dual of
    /// [`Self::forward_transition_with_gaps`]. Scans periods `1` up to `W`;
    /// `to_background` is the same for every period (unlike the forward
    /// pass, where the background contribution is period-scaled).
    fn backward_transition_with_gaps(&mut self, params: &Params) {
        let w = self.fg.len();
        debug_assert!(w >= 2);

        let to_background = params.f2b() * self.bg;
        let growth = params.b2f_growth();
        let f2f1 = params.f2f1();
        let f2f2 = params.f2f2();
        let one_gap = params.one_gap_prob();
        let end_gap = params.end_gap_prob();
        let g2g = params.g2g();

        let old_f0 = self.fg[0];
        let old_i0 = self.ins[0];
        let mut to_foreground = old_f0;

        self.fg[0] = to_background + f2f1 * old_f0 + old_i0;
        let mut d = end_gap * old_f0;
        to_foreground *= growth;

        for idx in 1..w - 1 {
            let f = self.fg[idx];
            let i = self.ins[idx];
            to_foreground += f;
            self.fg[idx] = to_background + f2f2 * f + (i + d);
            let one_gap_f = one_gap * f;
            self.ins[idx - 1] = one_gap_f + g2g * i;
            d = one_gap_f + g2g * d;
            to_foreground *= growth;
        }

        let f_top = self.fg[w - 1];
        to_foreground += f_top;
        self.fg[w - 1] = to_background + f2f1 * f_top + d;
        self.ins[w - 2] = end_gap * f_top;

        self.bg = params.b2b() * self.bg + params.b2f_last() * to_foreground;
    }

    fn backward_transition_no_gaps(&mut self, params: &Params) {
        let to_background = params.f2b() * self.bg;
        let growth = params.b2f_growth();
        let f2f0 = params.f2f0();
        let mut to_foreground = 0.0;

        for idx in 0..self.fg.len() {
            to_foreground *= growth;
            let f = self.fg[idx];
            to_foreground += f;
            self.fg[idx] = to_background + f2f0 * f;
        }

        self.bg = params.b2b() * self.bg + params.b2f_last() * to_foreground;
    }

    pub(crate) fn backward_transition(&mut self, params: &Params) {
        if params.has_gaps() {
            self.backward_transition_with_gaps(params);
        } else {
            self.backward_transition_no_gaps(params);
        }
    }
}

/// Forward pass for [`crate::model::transitions::count_transitions`]:
/// captures `fp[p]` *before* this position's own transition/emission/rescale
/// are applied, matching `countTransitions`'s `*letterProbs = backgroundProb;
/// calcForwardTransitionProbs(); ...` order (tantan.cc:358-362). Returns the
/// per-position captured background scalars, the recorded rescale factors,
/// the forward total `Z`, and the raw final background value (distinct from
/// `Z`: it is `Z` without the closing `b2b`/`f2b` terms folded in, needed for
/// the final `T[0]` contribution of spec §4.4).
pub(crate) fn forward_pass(seq: &[u8], params: &Params, emissions: &EmissionTable) -> (Vec<f64>, Vec<f64>, f64, f64) {
    let w = params.max_repeat_offset;
    let n = seq.len();
    let mut state = StateVectors::init_forward(w);
    let mut fp = Vec::with_capacity(n);
    let mut scales = vec![1.0; n / RESCALE_PERIOD + 1];

    for p in 0..n {
        fp.push(state.bg);
        state.forward_transition(params);
        state.apply_emission(emissions, seq, p);
        if p % RESCALE_PERIOD == RESCALE_PERIOD - 1 {
            scales[p / RESCALE_PERIOD] = state.rescale_forward();
        }
    }

    let z = state.forward_total(params);
    (fp, scales, z, state.bg)
}

/// Forward pass for [`get_probabilities`]: captures `fp[p]` *after* this
/// position's own transition/emission/rescale are applied, matching
/// `calcRepeatProbs`'s `calcForwardTransitionProbs(); calcEmissionProbs();
/// rescaleForward(); *letterProbs = backgroundProb;` order (tantan.cc:322-326).
/// This is a distinct schedule from [`forward_pass`]'s, not an alternative
/// implementation of the same one: `get_probabilities` and
/// `count_transitions` read the forward background scalar at two different
/// points in the recurrence.
fn forward_pass_for_probabilities(seq: &[u8], params: &Params, emissions: &EmissionTable) -> (Vec<f64>, Vec<f64>, f64) {
    let w = params.max_repeat_offset;
    let n = seq.len();
    let mut state = StateVectors::init_forward(w);
    let mut fp = Vec::with_capacity(n);
    let mut scales = vec![1.0; n / RESCALE_PERIOD + 1];

    for p in 0..n {
        state.forward_transition(params);
        state.apply_emission(emissions, seq, p);
        if p % RESCALE_PERIOD == RESCALE_PERIOD - 1 {
            scales[p / RESCALE_PERIOD] = state.rescale_forward();
        }
        fp.push(state.bg);
    }

    let z = state.forward_total(params);
    (fp, scales, z)
}

/// Backward pass for [`get_probabilities`]. `on_position` is invoked once per
/// position, in descending order, with the per-position forward scalar
/// `fp[p]` and the backward state as it arrives at `p` — i.e. before this
/// position's own rescale, emission, or transition are applied, matching
/// `calcRepeatProbs`'s backward loop (tantan.cc:335-346), which reads
/// `backgroundProb` before `rescaleBackward`/`calcEmissionProbs`/
/// `calcBackwardTransitionProbs`. Returns the final backward total.
pub(crate) fn backward_pass(
    seq: &[u8],
    params: &Params,
    emissions: &EmissionTable,
    fp: &[f64],
    scales: &[f64],
    mut on_position: impl FnMut(usize, f64, &StateVectors),
) -> f64 {
    let n = seq.len();
    let mut state = StateVectors::init_backward(params, params.max_repeat_offset);

    for p in (0..n).rev() {
        on_position(p, fp[p], &state);
        if p % RESCALE_PERIOD == RESCALE_PERIOD - 1 {
            state.rescale_backward(scales[p / RESCALE_PERIOD]);
        }
        state.apply_emission(emissions, seq, p);
        state.backward_transition(params);
    }

    state.bg
}

/// Backward pass for [`crate::model::transitions::count_transitions`].
/// `on_position` is invoked *after* this position's rescale and emission are
/// applied, but before its transition, matching `countTransitions`'s backward
/// loop (tantan.cc:373-380): `rescaleBackward(); calcEmissionProbs();
/// addTransitionCounts(...); calcBackwardTransitionProbs();`. This puts the
/// emission factor `E[seq[p]][seq[p-k]]` into `state.fg()` before
/// `on_position` sees it, unlike [`backward_pass`].
pub(crate) fn backward_pass_post_emission(
    seq: &[u8],
    params: &Params,
    emissions: &EmissionTable,
    fp: &[f64],
    scales: &[f64],
    mut on_position: impl FnMut(usize, f64, &StateVectors),
) -> f64 {
    let n = seq.len();
    let mut state = StateVectors::init_backward(params, params.max_repeat_offset);

    for p in (0..n).rev() {
        if p % RESCALE_PERIOD == RESCALE_PERIOD - 1 {
            state.rescale_backward(scales[p / RESCALE_PERIOD]);
        }
        state.apply_emission(emissions, seq, p);
        on_position(p, fp[p], &state);
        state.backward_transition(params);
    }

    state.bg
}

/// C3 + `get_probabilities` (spec §6, operation 2): writes one posterior
/// repeat probability per input position and returns `true` when the
/// forward/backward numerical check (spec §4.3) fails.
pub fn get_probabilities(seq: &[u8], params: &Params, emissions: &EmissionTable, out: &mut [f32]) -> bool {
    assert_eq!(seq.len(), out.len());
    let n = seq.len();
    if n == 0 {
        return false;
    }

    let (fp, scales, z) = forward_pass_for_probabilities(seq, params, emissions);
    let z2 = backward_pass(seq, params, emissions, &fp, &scales, |p, fp_p, state| {
        let non_repeat_prob = fp_p * state.bg / z;
        // Narrow to f32 before subtracting, so e.g. a non-repeat probability
        // of 0.99999994 rounds to exactly 1.0 (repeat probability 0.0) for
        // the first letter of a sequence, instead of leaving a ~6e-8 residue.
        out[p] = 1.0f32 - (non_repeat_prob as f32);
    });

    report_mismatch(z, z2)
}

/// Spec §4.3, "Numerical check": advisory-only, logged via [`log::warn!`]
/// rather than surfaced as an `Error` (spec §7).
pub(crate) fn report_mismatch(z: f64, z2: f64) -> bool {
    let mismatch = (z - z2).abs() > z.abs().max(z2.abs()) * 1e-6;
    if mismatch {
        warn!(
            "forward total {:e} disagrees with backward total {:e} (relative error exceeds 1e-6)",
            z, z2
        );
    }
    mismatch
}

/// `mask_sequences` (spec §6, operation 1): replaces `seq[i]` with
/// `mask_table[seq[i]]` wherever the posterior repeat probability at `i`
/// meets `min_mask_prob`.
pub fn mask_sequence(
    seq: &mut [u8],
    params: &Params,
    emissions: &EmissionTable,
    min_mask_prob: f32,
    mask_table: &[u8; 256],
) -> bool {
    let mut probabilities = vec![0f32; seq.len()];
    let mismatch = get_probabilities(seq, params, emissions, &mut probabilities);
    for (byte, &prob) in seq.iter_mut().zip(probabilities.iter()) {
        if prob >= min_mask_prob {
            *byte = mask_table[*byte as usize];
        }
    }
    mismatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::ParamsBuilder;
    use ndarray::Array2;

    fn identity_ratio_table(alphabet_size: usize) -> EmissionTable {
        let mut table = Array2::from_elem((alphabet_size, alphabet_size), 0.25);
        for i in 0..alphabet_size {
            table[[i, i]] = 1.0;
        }
        EmissionTable::new(table)
    }

    #[test]
    fn test_pure_background_probabilities_are_low() {
        let params = ParamsBuilder::default().max_repeat_offset(4).build().unwrap();
        let emissions = identity_ratio_table(4);
        let seq = [0u8, 1, 2, 3, 0, 1, 2, 3];
        let mut probs = vec![0f32; seq.len()];
        get_probabilities(&seq, &params, &emissions, &mut probs);
        for p in probs {
            assert!(p < 0.1, "expected low repeat probability, got {}", p);
        }
    }

    #[test]
    fn test_perfect_dinucleotide_repeat_probabilities_are_high() {
        let params = ParamsBuilder::default().max_repeat_offset(4).build().unwrap();
        let emissions = identity_ratio_table(4);
        // "ATATATATATATATAT" encoded over a 4-symbol alphabet as 0,1 cycling.
        let seq = [0u8, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let mut probs = vec![0f32; seq.len()];
        get_probabilities(&seq, &params, &emissions, &mut probs);
        for p in &probs[2..] {
            assert!(*p > 0.9, "expected high repeat probability, got {}", p);
        }
    }

    #[test]
    fn test_edge_sequence_of_length_one_rounds_to_zero() {
        let params = ParamsBuilder::default().max_repeat_offset(4).build().unwrap();
        let emissions = identity_ratio_table(4);
        let seq = [0u8];
        let mut probs = vec![1f32];
        get_probabilities(&seq, &params, &emissions, &mut probs);
        assert_eq!(probs[0], 0.0);
    }

    #[test]
    fn test_mask_sequence_is_noop_with_identity_table() {
        let params = ParamsBuilder::default().max_repeat_offset(4).build().unwrap();
        let emissions = identity_ratio_table(4);
        let mut seq = [0u8, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let original = seq;
        let mut mask_table = [0u8; 256];
        for (i, slot) in mask_table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        mask_sequence(&mut seq, &params, &emissions, 0.5, &mask_table);
        assert_eq!(seq, original);
    }

    #[test]
    fn test_mask_sequence_masks_high_probability_positions() {
        let params = ParamsBuilder::default().max_repeat_offset(4).build().unwrap();
        let emissions = identity_ratio_table(4);
        let mut seq = [0u8, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1];
        let mask_table = [0xFFu8; 256];
        mask_sequence(&mut seq, &params, &emissions, 0.5, &mask_table);
        for &byte in &seq[2..] {
            assert_eq!(byte, 0xFF);
        }
    }
}
