//! The probabilistic repeat-masking engine (spec §2-§5): emission table and
//! parameters (C1/C2), the forward/backward probability engine (C3), the
//! expected-transition counter (C4), and the checkpointed Viterbi repeat
//! finder (C5). C6 (the shared emission policy) lives in [`emission`] and
//! is used by all three passes.

pub mod emission;
pub mod forward_backward;
pub mod params;
pub mod transitions;
pub mod viterbi;

pub use emission::EmissionTable;
pub use forward_backward::{get_probabilities, mask_sequence};
pub use params::{Params, ParamsBuilder};
pub use transitions::count_transitions;
pub use viterbi::{RepeatFinder, State};
