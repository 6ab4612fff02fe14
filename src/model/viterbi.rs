//! C5, the checkpointed Viterbi repeat finder (spec §4.5), and the
//! `find_repeats` external operation built on top of it (spec §6).
//!
//! The DP table lives in one contiguous buffer of `s` "slots" (each holding
//! `P = dpScoresPerLetter` log-scores for one sequence position) rather than
//! the full `O(N)` table a naive Viterbi would need. `s` is the smallest
//! integer with `s(s-1)/2 >= N`, giving `O(W*sqrt(N))` memory. Only a sparse
//! subset of slots (the "checkpoints") hold data for the long term; the rest
//! are repeatedly overwritten as [`RepeatFinder::next_state`] walks forward
//! and, on crossing a checkpoint boundary, [`RepeatFinder::redo_checkpoint`]
//! regenerates the detail in between by re-running the backward recurrence.

use crate::model::emission::EmissionTable;
use crate::model::params::Params;

/// A Viterbi path state at one sequence position (spec §3, state encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Non-repeat background.
    Background,
    /// Inside a tandem repeat with the given period.
    Foreground(usize),
    /// A single-base insertion/deletion while tracking the given period.
    Insertion(usize),
}

impl State {
    fn from_raw(raw: usize, w: usize) -> Self {
        if raw == 0 {
            State::Background
        } else if raw <= w {
            State::Foreground(raw)
        } else {
            State::Insertion(raw - w)
        }
    }
}

fn max3(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).max(c)
}

/// Smallest `s` with `s(s-1)/2 >= n` (spec §4.5, checkpoint count).
fn min_checkpoint_count(n: usize) -> usize {
    let mut s = 1usize;
    while s * (s - 1) / 2 < n {
        s += 1;
    }
    s
}

/// The checkpointed Viterbi repeat finder.
pub struct RepeatFinder {
    params: Params,
    log_emissions: EmissionTable,
    w: usize,
    p: usize,
    has_gaps: bool,
    seq: Vec<u8>,
    buffer: Vec<f64>,
    num_slots: usize,
    scores_slot: usize,
    checkpoint_slot: usize,
    seq_pos: usize,
    state: usize,
}

impl RepeatFinder {
    /// `log_emissions` must already be in log space (spec §4.1).
    pub fn new(params: Params, log_emissions: EmissionTable) -> Self {
        let w = params.max_repeat_offset;
        let has_gaps = params.has_gaps();
        let p = if has_gaps { 2 * w } else { w + 1 };
        RepeatFinder {
            params,
            log_emissions,
            w,
            p,
            has_gaps,
            seq: Vec::new(),
            buffer: Vec::new(),
            num_slots: 0,
            scores_slot: 0,
            checkpoint_slot: 0,
            seq_pos: 0,
            state: 0,
        }
    }

    fn base(&self, slot: usize) -> usize {
        slot * self.p
    }

    /// Best (highest-scoring) path's log-score, and resets internal state
    /// so that exactly `seq.len()` subsequent calls to [`next_state`] replay
    /// that path from left to right (spec §4.5).
    ///
    /// [`next_state`]: RepeatFinder::next_state
    pub fn calc_best_path_score(&mut self, seq: &[u8]) -> f64 {
        self.seq = seq.to_vec();
        let n = seq.len();
        self.num_slots = min_checkpoint_count(n).max(1);
        self.buffer = vec![0.0; self.num_slots * self.p];
        self.scores_slot = 0;
        self.checkpoint_slot = 0;
        self.seq_pos = n;

        self.initialize_backward_scores(0);

        while self.seq_pos > 0 {
            self.seq_pos -= 1;
            self.scores_slot += 1;
            if self.scores_slot == self.num_slots {
                self.make_checkpoint();
            }
            let old_slot = self.scores_slot - 1;
            let new_slot = self.scores_slot;
            self.calc_scores_for_one_position(self.seq_pos, old_slot, new_slot);
        }

        self.state = 0;
        self.buffer[self.base(self.scores_slot)]
    }

    /// Advances the replay by one position (left to right) and returns the
    /// state the best path occupies there. Must be called exactly
    /// `seq.len()` times after a [`calc_best_path_score`] call.
    ///
    /// [`calc_best_path_score`]: RepeatFinder::calc_best_path_score
    pub fn next_state(&mut self) -> State {
        let current_slot = self.scores_slot;
        let max_score = self.buffer[self.base(current_slot) + self.state];

        if current_slot == self.checkpoint_slot {
            self.redo_checkpoint();
        }
        self.scores_slot -= 1;
        let prev_base = self.base(self.scores_slot);

        let ln_b2b = self.params.ln_b2b();
        let ln_f2b = self.params.ln_f2b();
        let ln_f2f1 = self.params.ln_f2f1();
        let ln_f2f2 = self.params.ln_f2f2();
        let ln_g2g = self.params.ln_g2g();

        if self.state == 0 {
            if ln_b2b + self.buffer[prev_base] < max_score {
                self.state = self.offset_with_max_score();
            }
        } else if self.state <= self.w {
            if ln_f2b + self.buffer[prev_base] >= max_score {
                self.state = 0;
            } else if self.has_gaps {
                let f = self.score_with_emission(self.state);
                if self.state == 1 {
                    if ln_f2f1 + f < max_score {
                        self.state += self.w;
                    }
                } else if self.state == self.w {
                    if ln_f2f1 + f < max_score {
                        self.state = self.deletion_with_max_score();
                    }
                } else if ln_f2f2 + f < max_score {
                    if self.buffer[prev_base + self.state + self.w] >= max_score {
                        self.state += self.w;
                    } else {
                        self.state = self.deletion_with_max_score();
                    }
                }
            }
        } else {
            self.state += 1;
            if self.state == self.p || ln_g2g + self.buffer[prev_base + self.state] < max_score {
                self.state -= self.w;
            }
        }

        self.seq_pos += 1;
        State::from_raw(self.state, self.w)
    }

    fn score_with_emission(&self, offset: usize) -> f64 {
        let prev_base = self.base(self.scores_slot);
        let s = self.seq[self.seq_pos];
        self.buffer[prev_base + offset] + self.log_emissions.ratio(s, self.seq[self.seq_pos - offset])
    }

    /// Background -> foreground: the period maximizing `F_k + growth^k`,
    /// scanned incrementally so ties break toward the smallest `k` (spec
    /// §4.5, "offset with max score").
    fn offset_with_max_score(&self) -> usize {
        let max_offset = self.seq_pos.min(self.w);
        let growth = self.params.ln_b2f_growth();
        let prev_base = self.base(self.scores_slot);
        let s = self.seq[self.seq_pos];

        let mut best_offset = 0usize;
        let mut to_foreground = std::f64::NEG_INFINITY;
        for i in 1..=max_offset {
            to_foreground += growth;
            let f = self.buffer[prev_base + i] + self.log_emissions.ratio(s, self.seq[self.seq_pos - i]);
            if f > to_foreground {
                to_foreground = f;
                best_offset = i;
            }
        }
        best_offset
    }

    /// Foreground period `k` closing a multi-base deletion: the period
    /// `j < k` maximizing `F_j` under the multi-base gap score (spec §4.5,
    /// "deletion with max score").
    fn deletion_with_max_score(&self) -> usize {
        let prev_base = self.base(self.scores_slot);
        let s = self.seq[self.seq_pos];

        let mut best_offset = 1usize;
        let mut f = self.buffer[prev_base + 1] + self.log_emissions.ratio(s, self.seq[self.seq_pos - 1]);
        let mut d = self.params.ln_end_gap_prob() + f;
        for i in 2..self.state {
            d += self.params.ln_g2g();
            f = self.buffer[prev_base + i] + self.log_emissions.ratio(s, self.seq[self.seq_pos - i]);
            let one_gap_f = self.params.ln_one_gap_prob() + f;
            if one_gap_f > d {
                d = one_gap_f;
                best_offset = i;
            }
        }
        best_offset
    }

    fn initialize_backward_scores(&mut self, slot: usize) {
        let base = self.base(slot);
        self.buffer[base] = self.params.ln_b2b();
        for k in 1..=self.w {
            self.buffer[base + k] = self.params.ln_f2b();
        }
        if self.has_gaps {
            for k in self.w + 1..self.p {
                self.buffer[base + k] = std::f64::NEG_INFINITY;
            }
        }
    }

    fn make_checkpoint(&mut self) {
        let src_base = self.base(self.num_slots - 1);
        self.checkpoint_slot += 1;
        let dst_base = self.base(self.checkpoint_slot);
        self.buffer.copy_within(src_base..src_base + self.p, dst_base);
        self.scores_slot = self.checkpoint_slot + 1;
    }

    /// Regenerates slots `checkpoint_slot..num_slots` by re-running the
    /// backward recurrence forward (in slot order) from the previous,
    /// coarser checkpoint at `checkpoint_slot - 1` (spec §4.5).
    fn redo_checkpoint(&mut self) {
        let checkpoint_slot = self.checkpoint_slot;
        debug_assert!(checkpoint_slot > 0, "redo_checkpoint called with no earlier checkpoint");

        let mut pos = self.seq_pos + (self.num_slots - checkpoint_slot);
        let mut src_slot = checkpoint_slot - 1;
        for dst_slot in checkpoint_slot..self.num_slots {
            pos -= 1;
            self.calc_scores_for_one_position(pos, src_slot, dst_slot);
            src_slot = dst_slot;
        }

        self.scores_slot = self.num_slots - 1;
        self.checkpoint_slot = checkpoint_slot - 1;
    }

    fn calc_scores_for_one_position(&mut self, pos: usize, old_slot: usize, new_slot: usize) {
        self.emit_into_slot(pos, old_slot, new_slot);
        self.backward_transition_in_place(new_slot);
    }

    /// C6, log-space, cross-slot variant: background and insertion states
    /// carry over from `old_slot` unchanged, foreground slots pick up
    /// `ln E[seq[pos]][seq[pos-k]]`, and slots beyond the left edge of the
    /// sequence become `-inf`.
    fn emit_into_slot(&mut self, pos: usize, old_slot: usize, new_slot: usize) {
        let w = self.w;
        let (old_part, new_part) = self.buffer.split_at_mut(new_slot * self.p);
        let old = &old_part[old_slot * self.p..old_slot * self.p + self.p];
        let new = &mut new_part[..self.p];

        new[0] = old[0];
        let max_offset = pos.min(w);
        let s = self.seq[pos];
        for k in 1..=max_offset {
            new[k] = old[k] + self.log_emissions.ratio(s, self.seq[pos - k]);
        }
        for k in (max_offset + 1)..=w {
            new[k] = std::f64::NEG_INFINITY;
        }
        if self.has_gaps {
            new[w + 1..self.p].copy_from_slice(&old[w + 1..self.p]);
        }
    }

    fn backward_transition_in_place(&mut self, slot: usize) {
        if self.has_gaps {
            self.backward_transition_with_gaps(slot);
        } else {
            self.backward_transition_no_gaps(slot);
        }
    }

    fn backward_transition_with_gaps(&mut self, slot: usize) {
        let w = self.w;
        let base = self.base(slot);
        let ln_f2b = self.params.ln_f2b();
        let ln_f2f1 = self.params.ln_f2f1();
        let ln_f2f2 = self.params.ln_f2f2();
        let ln_one_gap = self.params.ln_one_gap_prob();
        let ln_end_gap = self.params.ln_end_gap_prob();
        let ln_g2g = self.params.ln_g2g();
        let ln_growth = self.params.ln_b2f_growth();

        let to_background = ln_f2b + self.buffer[base];

        let f0 = self.buffer[base + 1];
        let i0 = self.buffer[base + w + 1];
        let mut to_foreground = f0;
        self.buffer[base + 1] = max3(to_background, ln_f2f1 + f0, i0);
        let mut d = ln_end_gap + f0;
        to_foreground += ln_growth;

        for k in 2..w {
            let f = self.buffer[base + k];
            let i = self.buffer[base + w + k];
            to_foreground = to_foreground.max(f);
            self.buffer[base + k] = max3(to_background, ln_f2f2 + f, i.max(d));
            let one_gap_f = ln_one_gap + f;
            self.buffer[base + w + k - 1] = one_gap_f.max(ln_g2g + i);
            d = one_gap_f.max(ln_g2g + d);
            to_foreground += ln_growth;
        }

        let f_top = self.buffer[base + w];
        to_foreground = to_foreground.max(f_top);
        self.buffer[base + w] = max3(to_background, ln_f2f1 + f_top, d);
        self.buffer[base + 2 * w - 1] = ln_end_gap + f_top;

        self.buffer[base] = (self.params.ln_b2b() + self.buffer[base]).max(self.params.ln_b2f_last() + to_foreground);
    }

    fn backward_transition_no_gaps(&mut self, slot: usize) {
        let base = self.base(slot);
        let ln_f2b = self.params.ln_f2b();
        let ln_f2f0 = self.params.ln_f2f0();
        let ln_growth = self.params.ln_b2f_growth();

        let to_background = ln_f2b + self.buffer[base];
        let mut to_foreground = std::f64::NEG_INFINITY;

        for k in 1..=self.w {
            to_foreground += ln_growth;
            let f = self.buffer[base + k];
            to_foreground = to_foreground.max(f);
            self.buffer[base + k] = max3(to_background, ln_f2f0 + f, std::f64::NEG_INFINITY);
        }

        self.buffer[base] = (self.params.ln_b2b() + self.buffer[base]).max(self.params.ln_b2f_last() + to_foreground);
    }
}
