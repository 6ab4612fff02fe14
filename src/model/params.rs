//! Derived transition parameters of the hidden-state repeat model (spec §3).
//!
//! [`Params`] stores every scalar derived once per run from the user-facing
//! knobs (`repeat_prob`, `repeat_end_prob`, ...). Two flavours are kept: the
//! linear-probability scalars consumed by the forward/backward engine and
//! transition counter, and their natural-log counterparts consumed by the
//! Viterbi engine, computed with the same formulas in log space.

use derive_builder::Builder;

use crate::errors::Error;

/// `q(m, W)`: probability of the first (or, dually, the last) foreground
/// period under the geometric offset-decay model (spec §3, `b2fLast`/`b2fFirst`).
fn first_repeat_offset_prob(prob_mult: f64, max_repeat_offset: usize) -> f64 {
    let w = max_repeat_offset as f64;
    if prob_mult < 1.0 || prob_mult > 1.0 {
        (1.0 - prob_mult) / (1.0 - prob_mult.powf(w))
    } else {
        1.0 / w
    }
}

/// Natural log with the `log 0 = -inf` convention used throughout the
/// Viterbi (log-space) engine.
fn ln(x: f64) -> f64 {
    if x > 0.0 {
        x.ln()
    } else {
        std::f64::NEG_INFINITY
    }
}

/// Derived transition probabilities/log-scores, computed once per run from
/// the five user-facing rates and the maximum repeat period `W` (spec §3,
/// §4.1). Validated at construction time via [`ParamsBuilder::build`];
/// internal recurrences may then assume every precondition holds.
#[derive(Builder, Debug, Clone, Copy, PartialEq)]
#[builder(build_fn(validate = "Self::validate", error = "Error"))]
pub struct Params {
    /// Longest tandem-repeat period considered (`W` in spec.md).
    #[builder(default = "100")]
    pub max_repeat_offset: usize,
    /// Probability of entering a repeat tract at any given position.
    #[builder(default = "0.005")]
    pub repeat_prob: f64,
    /// Probability of leaving a repeat tract at any given position.
    #[builder(default = "0.05")]
    pub repeat_end_prob: f64,
    /// Decay ratio between the entry probabilities of successive periods.
    #[builder(default = "0.9")]
    pub repeat_offset_prob_decay: f64,
    /// Probability of starting a single-base insertion/deletion in a repeat.
    #[builder(default = "0.0")]
    pub first_gap_prob: f64,
    /// Probability of extending an open insertion/deletion by one more base.
    #[builder(default = "0.25")]
    pub other_gap_prob: f64,
}

impl ParamsBuilder {
    fn validate(&self) -> Result<(), Error> {
        let w = self.max_repeat_offset.unwrap_or(100);
        let repeat_prob = self.repeat_prob.unwrap_or(0.005);
        let repeat_end_prob = self.repeat_end_prob.unwrap_or(0.05);
        let decay = self.repeat_offset_prob_decay.unwrap_or(0.9);
        let first_gap_prob = self.first_gap_prob.unwrap_or(0.0);
        let other_gap_prob = self.other_gap_prob.unwrap_or(0.25);

        if w < 1 {
            return Err(Error::InvalidModelParam {
                msg: "max_repeat_offset must be >= 1".to_owned(),
            });
        }
        if !(0.0..1.0).contains(&repeat_prob) {
            return Err(Error::InvalidModelParam {
                msg: "repeat_prob must be in [0, 1)".to_owned(),
            });
        }
        if !(0.0..=1.0).contains(&repeat_end_prob) {
            return Err(Error::InvalidModelParam {
                msg: "repeat_end_prob must be in [0, 1]".to_owned(),
            });
        }
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(Error::InvalidModelParam {
                msg: "repeat_offset_prob_decay must be in (0, 1]".to_owned(),
            });
        }
        if first_gap_prob < 0.0 {
            return Err(Error::InvalidModelParam {
                msg: "first_gap_prob must be >= 0".to_owned(),
            });
        }
        if !(0.0..=1.0).contains(&other_gap_prob) {
            return Err(Error::InvalidModelParam {
                msg: "other_gap_prob must be in [0, 1]".to_owned(),
            });
        }
        if repeat_end_prob + 2.0 * first_gap_prob > 1.0 {
            return Err(Error::InvalidModelParam {
                msg: "repeat_end_prob + 2 * first_gap_prob must be <= 1".to_owned(),
            });
        }

        Ok(())
    }
}

impl Params {
    /// Whether the insertion/deletion states are active (`endGapProb > 0`).
    pub fn has_gaps(&self) -> bool {
        self.end_gap_prob() > 0.0
    }

    pub fn b2b(&self) -> f64 {
        1.0 - self.repeat_prob
    }

    pub fn f2b(&self) -> f64 {
        self.repeat_end_prob
    }

    pub fn b2f_growth(&self) -> f64 {
        1.0 / self.repeat_offset_prob_decay
    }

    pub fn b2f_decay(&self) -> f64 {
        self.repeat_offset_prob_decay
    }

    pub fn b2f_last(&self) -> f64 {
        self.repeat_prob
            * first_repeat_offset_prob(self.b2f_growth(), self.max_repeat_offset)
    }

    pub fn b2f_first(&self) -> f64 {
        self.repeat_prob
            * first_repeat_offset_prob(self.b2f_decay(), self.max_repeat_offset)
    }

    pub fn one_gap_prob(&self) -> f64 {
        self.first_gap_prob * (1.0 - self.other_gap_prob)
    }

    pub fn end_gap_prob(&self) -> f64 {
        if self.max_repeat_offset > 1 {
            self.first_gap_prob
        } else {
            0.0
        }
    }

    pub fn f2f0(&self) -> f64 {
        1.0 - self.repeat_end_prob
    }

    pub fn f2f1(&self) -> f64 {
        1.0 - self.repeat_end_prob - self.first_gap_prob
    }

    pub fn f2f2(&self) -> f64 {
        1.0 - self.repeat_end_prob - 2.0 * self.first_gap_prob
    }

    pub fn g2g(&self) -> f64 {
        self.other_gap_prob
    }

    // Log-space duals, used by the Viterbi engine (spec §4.1: "the Viterbi
    // engine receives log-ratios").

    pub fn ln_b2b(&self) -> f64 {
        ln(self.b2b())
    }

    pub fn ln_f2b(&self) -> f64 {
        ln(self.f2b())
    }

    pub fn ln_b2f_growth(&self) -> f64 {
        ln(self.b2f_growth())
    }

    pub fn ln_b2f_last(&self) -> f64 {
        ln(self.b2f_last())
    }

    pub fn ln_one_gap_prob(&self) -> f64 {
        ln(self.one_gap_prob())
    }

    pub fn ln_end_gap_prob(&self) -> f64 {
        ln(self.end_gap_prob())
    }

    pub fn ln_f2f0(&self) -> f64 {
        ln(self.f2f0())
    }

    pub fn ln_f2f1(&self) -> f64 {
        ln(self.f2f1())
    }

    pub fn ln_f2f2(&self) -> f64 {
        ln(self.f2f2())
    }

    pub fn ln_g2g(&self) -> f64 {
        ln(self.g2g())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        ParamsBuilder::default().build().unwrap();
    }

    #[test]
    fn test_rejects_bad_repeat_prob() {
        let res = ParamsBuilder::default().repeat_prob(1.0).build();
        assert!(res.is_err());
    }

    #[test]
    fn test_rejects_gap_prob_overflow() {
        let res = ParamsBuilder::default()
            .repeat_end_prob(0.8)
            .first_gap_prob(0.2)
            .build();
        assert!(res.is_err());
    }

    #[test]
    fn test_no_gaps_when_w_is_one() {
        let params = ParamsBuilder::default()
            .max_repeat_offset(1)
            .first_gap_prob(0.1)
            .build()
            .unwrap();
        assert_eq!(params.end_gap_prob(), 0.0);
        assert!(!params.has_gaps());
    }

    #[test]
    fn test_b2f_last_uniform_when_decay_is_one() {
        let params = ParamsBuilder::default()
            .max_repeat_offset(4)
            .repeat_offset_prob_decay(1.0)
            .repeat_prob(0.1)
            .build()
            .unwrap();
        assert_relative_eq!(params.b2f_last(), 0.1 / 4.0, epsilon = 1e-12);
        assert_relative_eq!(params.b2f_first(), 0.1 / 4.0, epsilon = 1e-12);
    }
}
