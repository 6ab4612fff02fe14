// Copyright 2021 the tantan-rs authors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! End-to-end scenarios (spec.md §8) plus CLI round-trips, using real
//! `tantan::model` wiring rather than mocked collaborators.

use std::io::Write;
use std::process::Command;

use ndarray::Array2;
use tempfile::NamedTempFile;

use tantan::alphabet::Alphabet;
use tantan::model::{count_transitions, get_probabilities, mask_sequence, EmissionTable, ParamsBuilder, RepeatFinder, State};

fn identity_ratio_table(alphabet_size: usize) -> EmissionTable {
    let mut table = Array2::from_elem((alphabet_size, alphabet_size), 0.25);
    for i in 0..alphabet_size {
        table[[i, i]] = 1.0;
    }
    EmissionTable::new(table)
}

fn default_params() -> tantan::model::Params {
    ParamsBuilder::default()
        .max_repeat_offset(4)
        .repeat_prob(0.005)
        .repeat_end_prob(0.05)
        .repeat_offset_prob_decay(0.9)
        .build()
        .unwrap()
}

#[test]
fn scenario_1_pure_background_dna_stays_unmasked() {
    let alphabet = Alphabet::dna();
    let seq = alphabet.encode(b"ACGTACGT").unwrap();
    let params = default_params();
    let emissions = identity_ratio_table(alphabet.size());

    let mut probabilities = vec![0f32; seq.len()];
    get_probabilities(&seq, &params, &emissions, &mut probabilities);
    for &p in &probabilities {
        assert!(p < 0.1, "expected a low repeat probability for non-repetitive DNA, got {}", p);
    }

    let mut masked = seq.clone();
    mask_sequence(&mut masked, &params, &emissions, 0.5, &identity_mask_table());
    assert_eq!(masked, seq, "background sequence should be left unchanged by masking");
}

#[test]
fn scenario_2_perfect_dinucleotide_repeat_is_detected() {
    let alphabet = Alphabet::dna();
    let seq = alphabet.encode(b"ATATATATATATATAT").unwrap();
    let params = default_params();
    let emissions = identity_ratio_table(alphabet.size());

    let mut probabilities = vec![0f32; seq.len()];
    get_probabilities(&seq, &params, &emissions, &mut probabilities);
    for (i, &p) in probabilities.iter().enumerate().skip(2) {
        assert!(p > 0.9, "expected a high repeat probability at interior position {}, got {}", i, p);
    }
}

#[test]
fn scenario_3_transition_counts_dominated_by_period_two() {
    let alphabet = Alphabet::dna();
    let seq = alphabet.encode(b"ATATATATATATATAT").unwrap();
    let params = default_params();
    let emissions = identity_ratio_table(alphabet.size());

    let mut counts = vec![0.0; params.max_repeat_offset + 1];
    count_transitions(&seq, &params, &emissions, &mut counts);

    let period_two = counts[2];
    for (k, &count) in counts.iter().enumerate() {
        if k != 2 {
            assert!(period_two > count, "expected counts[2] ({}) to dominate counts[{}] ({})", period_two, k, count);
        }
    }
}

#[test]
fn scenario_4_mask_table_replaces_only_masked_positions() {
    let alphabet = Alphabet::dna();
    let seq = alphabet.encode(b"ATATATATATATATAT").unwrap();
    let params = default_params();
    let emissions = identity_ratio_table(alphabet.size());

    let mut probabilities = vec![0f32; seq.len()];
    get_probabilities(&seq, &params, &emissions, &mut probabilities);

    let mask_table = [0xFFu8; 256];
    let mut masked = seq.clone();
    mask_sequence(&mut masked, &params, &emissions, 0.5, &mask_table);

    for (i, (&original, &replaced)) in seq.iter().zip(masked.iter()).enumerate() {
        if probabilities[i] >= 0.5 {
            assert_eq!(replaced, 0xFF, "position {} should have been masked", i);
        } else {
            assert_eq!(replaced, original, "position {} should not have been masked", i);
        }
    }
}

#[test]
fn scenario_5_viterbi_settles_on_period_two_for_most_of_the_run() {
    let alphabet = Alphabet::dna();
    let seq = alphabet.encode(b"ATATATATATATATAT").unwrap();
    let params = default_params();
    let emissions = identity_ratio_table(alphabet.size()).to_log_space();

    let mut finder = RepeatFinder::new(params, emissions);
    finder.calc_best_path_score(&seq);

    let states: Vec<State> = (0..seq.len()).map(|_| finder.next_state()).collect();
    let period_two_run = states[2..16].iter().filter(|&&s| matches!(s, State::Foreground(2))).count();
    assert!(period_two_run >= 12, "expected most of positions 2..16 to settle on period 2, got {:?}", states);
}

#[test]
fn scenario_6_single_letter_sequence_has_zero_repeat_probability() {
    let alphabet = Alphabet::dna();
    let seq = alphabet.encode(b"A").unwrap();
    let params = default_params();
    let emissions = identity_ratio_table(alphabet.size());

    let mut probabilities = vec![0f32; 1];
    get_probabilities(&seq, &params, &emissions, &mut probabilities);
    assert_eq!(probabilities[0], 0.0);
}

fn identity_mask_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = i as u8;
    }
    table
}

fn tantan_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tantan"))
}

#[test]
fn cli_mask_round_trips_a_fasta_file() {
    let mut input = NamedTempFile::new().unwrap();
    writeln!(input, ">seq1\nATATATATATATATATATAT").unwrap();

    let output = tantan_bin()
        .args(["mask", input.path().to_str().unwrap()])
        .output()
        .expect("failed to run the tantan binary");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(">seq1"));
    assert!(
        stdout.to_lowercase().contains("atatatatat"),
        "expected at least part of the repeat to be soft-masked: {}",
        stdout
    );
}

#[test]
fn cli_repeats_reports_the_dinucleotide_tract() {
    let mut input = NamedTempFile::new().unwrap();
    writeln!(input, ">seq1\nGGGGGATATATATATATATATATGGGGG").unwrap();

    let output = tantan_bin()
        .args(["repeats", input.path().to_str().unwrap()])
        .output()
        .expect("failed to run the tantan binary");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("seq1"), "expected a reported repeat for seq1, got: {}", stdout);
}
