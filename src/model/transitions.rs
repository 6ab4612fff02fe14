//! C4, the expected-transition counter (spec §4.4), and the
//! `count_transitions` external operation (spec §6).

use crate::model::emission::EmissionTable;
use crate::model::forward_backward::{backward_pass_post_emission, forward_pass, report_mismatch};
use crate::model::params::Params;

/// `count_transitions` (spec §6, operation 3): adds expected transition
/// counts into `counts`, which must have length `W + 1`. `counts[0]`
/// accumulates expected `B -> B` transitions; `counts[k]` (`1 <= k <= W`)
/// accumulates expected entries into foreground period `k`. Returns `true`
/// when the forward/backward numerical check (spec §4.3) fails.
pub fn count_transitions(seq: &[u8], params: &Params, emissions: &EmissionTable, counts: &mut [f64]) -> bool {
    let w = params.max_repeat_offset;
    assert_eq!(counts.len(), w + 1);

    let n = seq.len();
    if n == 0 {
        return false;
    }

    let (fp, scales, z, bg_forward_final) = forward_pass(seq, params, emissions);
    let b2b = params.b2b();
    let b2f_first = params.b2f_first();
    let b2f_decay = params.b2f_decay();

    // Spec §4.4: "After the final position, add bg_forward_final * b2b / Z
    // to T[0]" — the transition out of background after the last letter,
    // which the per-position loop below never visits since it only pairs
    // forward state entering a position with backward state leaving it.
    counts[0] += bg_forward_final * b2b / z;

    let z2 = backward_pass_post_emission(seq, params, emissions, &fp, &scales, |_p, fp_p, state| {
        counts[0] += state.bg * (fp_p * b2b / z);

        let mut to_fg = fp_p * b2f_first / z;
        for (k, &f) in state.fg().iter().enumerate() {
            counts[k + 1] += f * to_fg;
            to_fg *= b2f_decay;
        }
    });

    report_mismatch(z, z2)
}
