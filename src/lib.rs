// Copyright 2021 the tantan-rs authors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! A probabilistic method to discover simple sequence repeats (tandem
//! repeats and other low-complexity regions) in DNA, RNA, or protein
//! sequences, after Frith, *A new repeat-masking method enables specific
//! detection of homologous sequences*, Nucleic Acids Research 2011.
//!
//! The core engine (forward/backward probabilities, expected-transition
//! counting, checkpointed Viterbi) lives under [`model`]; [`alphabet`] and
//! [`scoring`] turn raw sequence bytes and a scoring matrix into the
//! engine's inputs; [`reporting`] and [`io`] turn its outputs back into
//! FASTA, BED, and repeat records for the [`cli`].

#[macro_use]
extern crate approx;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod alphabet;
pub mod cli;
pub mod errors;
pub mod io;
pub mod model;
pub mod reporting;
pub mod scoring;
