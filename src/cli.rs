// Copyright 2021 the tantan-rs authors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! `structopt` CLI: `mask`, `probabilities`, `counts`, `repeats` (SPEC_FULL
//! §3), driving one [`Params`] + [`EmissionTable`] across every FASTA
//! record, in parallel with `rayon`, matching the original `tantan`
//! program's subcommand-free but output-type-switched shape
//! (`original_source/src/tantan_app.cc`'s `options.outputType`).

use std::error::Error as StdError;
use std::io::{self, Write};
use std::path::PathBuf;

use rayon::prelude::*;
use structopt::StructOpt;

use crate::alphabet::Alphabet;
use crate::errors::Error;
use crate::io::fasta::{self, Record};
use crate::model::emission::EmissionTable;
use crate::model::forward_backward::{get_probabilities, mask_sequence};
use crate::model::params::ParamsBuilder;
use crate::model::viterbi::RepeatFinder;
use crate::reporting;
use crate::scoring;

#[derive(Debug, StructOpt)]
pub struct ModelOpts {
    /// Treat sequences as protein rather than DNA/RNA.
    #[structopt(long)]
    pub protein: bool,
    /// Longest tandem-repeat period to consider.
    #[structopt(long)]
    pub max_repeat_offset: Option<usize>,
    /// Probability of entering a repeat tract at any position.
    #[structopt(long)]
    pub repeat_prob: Option<f64>,
    /// Probability of leaving a repeat tract at any position.
    #[structopt(long)]
    pub repeat_end_prob: Option<f64>,
    /// Decay ratio between successive periods' entry probabilities.
    #[structopt(long)]
    pub repeat_offset_prob_decay: Option<f64>,
    /// Probability of opening a single-base insertion/deletion in a repeat.
    #[structopt(long, default_value = "0.0")]
    pub first_gap_prob: f64,
    /// Probability of extending an open insertion/deletion by one base.
    #[structopt(long, default_value = "0.25")]
    pub other_gap_prob: f64,
    /// Match score for the default identity scoring matrix (DNA/RNA only).
    #[structopt(long, default_value = "1")]
    pub match_score: i32,
    /// Mismatch cost for the default identity scoring matrix (DNA/RNA only).
    #[structopt(long, default_value = "1")]
    pub mismatch_cost: i32,
    /// FASTA files to process; reads STDIN if none are given.
    #[structopt(parse(from_os_str))]
    pub input: Vec<PathBuf>,
}

impl ModelOpts {
    fn alphabet(&self) -> Alphabet {
        if self.protein {
            Alphabet::protein()
        } else {
            Alphabet::dna()
        }
    }

    fn resolved_max_repeat_offset(&self) -> usize {
        self.max_repeat_offset.unwrap_or(if self.protein { 50 } else { 100 })
    }

    fn build(&self) -> Result<(Alphabet, crate::model::params::Params, EmissionTable), Error> {
        let alphabet = self.alphabet();

        let scores = if self.protein {
            scoring::blosum62(&String::from_utf8(alphabet.decode(&(0..alphabet.size() as u8).collect::<Vec<_>>())).unwrap())?
        } else {
            scoring::match_mismatch(alphabet.size(), self.match_score, self.mismatch_cost)
        };

        let background = vec![1.0 / alphabet.size() as f64; alphabet.size()];
        let lambda = scoring::scale_factor_lambda(&scores, &background).ok_or(Error::LambdaNotFound)?;
        let emissions = EmissionTable::from_scores(&scores, lambda);

        let mut builder = ParamsBuilder::default();
        builder.max_repeat_offset(self.resolved_max_repeat_offset());
        if let Some(p) = self.repeat_prob {
            builder.repeat_prob(p);
        }
        if let Some(p) = self.repeat_end_prob {
            builder.repeat_end_prob(p);
        }
        if let Some(p) = self.repeat_offset_prob_decay {
            builder.repeat_offset_prob_decay(p);
        }
        builder.first_gap_prob(self.first_gap_prob);
        builder.other_gap_prob(self.other_gap_prob);
        let params = builder.build()?;

        Ok((alphabet, params, emissions))
    }

    fn records(&self) -> Result<Vec<Record>, Error> {
        if self.input.is_empty() {
            fasta::read_records(None)
        } else {
            let mut all = Vec::new();
            for path in &self.input {
                all.extend(fasta::read_records(Some(path))?);
            }
            Ok(all)
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "tantan", about = "Mask simple low-complexity and tandem-repeat regions in biological sequences.")]
pub enum Tantan {
    /// Mask repetitive regions in place and print the masked FASTA.
    Mask {
        #[structopt(flatten)]
        model: ModelOpts,
        /// Posterior repeat probability at or above which a position is masked.
        #[structopt(long, default_value = "0.5")]
        min_mask_prob: f32,
        /// Mask symbol to substitute (default: lowercase the input letter).
        #[structopt(long)]
        mask_symbol: Option<char>,
        /// Emit BED intervals of masked regions instead of a masked FASTA.
        #[structopt(long)]
        bed: bool,
    },
    /// Print each position's posterior repeat probability.
    Probabilities {
        #[structopt(flatten)]
        model: ModelOpts,
    },
    /// Print expected transition counts, accumulated across every input record.
    Counts {
        #[structopt(flatten)]
        model: ModelOpts,
    },
    /// Report explicit tandem-repeat tracts (period, copy number, consensus unit).
    Repeats {
        #[structopt(flatten)]
        model: ModelOpts,
        /// Minimum copy number for a repeat to be reported.
        #[structopt(long, default_value = "1.0")]
        min_copy_number: f64,
    },
}

pub fn run(opt: Tantan) -> Result<(), Box<dyn StdError>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match opt {
        Tantan::Mask { model, min_mask_prob, mask_symbol, bed } => {
            let (alphabet, params, emissions) = model.build()?;
            let mask_table = reporting::build_mask_table(&alphabet, mask_symbol.map(|c| c as u8));
            let records = model.records()?;

            if bed {
                let results: Vec<(String, Vec<f32>)> = records
                    .par_iter()
                    .map(|record| {
                        let codes = alphabet.encode(&record.seq).expect("fasta input already validated against alphabet");
                        let mut probabilities = vec![0f32; codes.len()];
                        get_probabilities(&codes, &params, &emissions, &mut probabilities);
                        (record.name().to_owned(), probabilities)
                    })
                    .collect();

                for (name, probabilities) in &results {
                    let intervals = reporting::bed_intervals(probabilities, min_mask_prob, name);
                    reporting::write_bed(&intervals, &mut out)?;
                }
            } else {
                let masked: Vec<Record> = records
                    .into_par_iter()
                    .map(|mut record| {
                        let mut codes = alphabet.encode(&record.seq).expect("fasta input already validated against alphabet");
                        let mismatch = mask_sequence(&mut codes, &params, &emissions, min_mask_prob, &mask_table);
                        if mismatch {
                            log::warn!("numerical mismatch masking {}", record.name());
                        }
                        record.seq = alphabet.decode(&codes);
                        record
                    })
                    .collect();

                for record in &masked {
                    fasta::write_record(&mut out, record)?;
                }
            }
        }

        Tantan::Probabilities { model } => {
            let (alphabet, params, emissions) = model.build()?;
            let records = model.records()?;

            let results: Vec<(String, Vec<f32>)> = records
                .into_par_iter()
                .map(|record| {
                    let codes = alphabet.encode(&record.seq).expect("fasta input already validated against alphabet");
                    let mut probabilities = vec![0f32; codes.len()];
                    get_probabilities(&codes, &params, &emissions, &mut probabilities);
                    (record.id, probabilities)
                })
                .collect();

            for (name, probabilities) in &results {
                reporting::write_probabilities(name, probabilities, &mut out)?;
            }
        }

        Tantan::Counts { model } => {
            let (alphabet, params, emissions) = model.build()?;
            let records = model.records()?;
            let mut summary = reporting::TransitionSummary::new(params.max_repeat_offset);

            let per_record: Vec<Vec<f64>> = records
                .par_iter()
                .map(|record| {
                    let codes = alphabet.encode(&record.seq).expect("fasta input already validated against alphabet");
                    let mut counts = vec![0.0; params.max_repeat_offset + 1];
                    crate::model::transitions::count_transitions(&codes, &params, &emissions, &mut counts);
                    counts
                })
                .collect();

            for (record, counts) in records.iter().zip(per_record.iter()) {
                summary.add_sequence(record.seq.len());
                for (slot, &count) in summary.counts.iter_mut().zip(counts.iter()) {
                    *slot += count;
                }
            }

            summary.write(&mut out)?;
        }

        Tantan::Repeats { model, min_copy_number } => {
            let (alphabet, params, emissions) = model.build()?;
            let log_emissions = emissions.to_log_space();
            let records = model.records()?;
            let max_repeat_offset = params.max_repeat_offset;

            let per_record: Vec<Vec<reporting::RepeatRecord>> = records
                .par_iter()
                .map(|record| {
                    let codes = alphabet.encode(&record.seq).expect("fasta input already validated against alphabet");
                    let mut finder = RepeatFinder::new(params, log_emissions.clone());
                    reporting::find_repeats(record.name(), &codes, &mut finder, &alphabet, max_repeat_offset, min_copy_number)
                })
                .collect();

            for records in &per_record {
                reporting::write_repeats(records, &mut out)?;
            }
        }
    }

    out.flush()?;
    Ok(())
}
