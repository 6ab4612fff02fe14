// Copyright 2021 the tantan-rs authors.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Turns the core engine's raw output (posterior probabilities, the
//! `RepeatFinder` state stream) into the record shapes a caller actually
//! wants: BED intervals, explicit repeat records, a probability table, and
//! mask tables for [`mask_sequence`](crate::model::forward_backward::mask_sequence).
//! Grounded in `original_source/src/tantan_app.cc`'s `writeBed`,
//! `findRepeatsInOneSequence`/`writeRepeat`, and `initMaskTable`.

use std::io::{self, Write};

use serde::Serialize;

use crate::alphabet::Alphabet;
use crate::model::viterbi::{RepeatFinder, State};

/// One maximal masked interval, BED-style (0-based, half-open).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskedInterval {
    pub seq_name: String,
    pub start: usize,
    pub end: usize,
}

/// Scans posterior probabilities for maximal runs at or above
/// `min_mask_prob`, per `writeBed`.
pub fn bed_intervals(probabilities: &[f32], min_mask_prob: f32, seq_name: &str) -> Vec<MaskedInterval> {
    let mut intervals = Vec::new();
    let mut open: Option<usize> = None;
    for (i, &p) in probabilities.iter().enumerate() {
        if p >= min_mask_prob {
            if open.is_none() {
                open = Some(i);
            }
        } else if let Some(start) = open.take() {
            intervals.push(MaskedInterval { seq_name: seq_name.to_owned(), start, end: i });
        }
    }
    if let Some(start) = open {
        intervals.push(MaskedInterval { seq_name: seq_name.to_owned(), start, end: probabilities.len() });
    }
    intervals
}

pub fn write_bed(intervals: &[MaskedInterval], out: &mut impl Write) -> io::Result<()> {
    for interval in intervals {
        writeln!(out, "{}\t{}\t{}", interval.seq_name, interval.start, interval.end)?;
    }
    Ok(())
}

/// One reported tandem repeat, per `writeRepeat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatRecord {
    pub seq_name: String,
    pub start: usize,
    pub end: usize,
    pub period: usize,
    pub copy_number: f64,
    pub consensus_unit: String,
    pub annotated_text: String,
}

pub fn write_repeats(records: &[RepeatRecord], out: &mut impl Write) -> io::Result<()> {
    for r in records {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.seq_name, r.start, r.end, r.period, r.copy_number, r.consensus_unit, r.annotated_text
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct RepeatUnit {
    beg: usize,
    len: usize,
}

fn sort_units(units: &mut [RepeatUnit], seq: &[u8]) {
    units.sort_by(|a, b| {
        a.len
            .cmp(&b.len)
            .then_with(|| seq[a.beg..a.beg + a.len].cmp(&seq[b.beg..b.beg + b.len]))
            .then_with(|| b.beg.cmp(&a.beg))
    });
}

/// The most common unit length among `units` (sorted by `sort_units`),
/// per `mainLen`: a run-length vote over contiguous equal-length runs.
fn main_len(units: &[RepeatUnit]) -> usize {
    let mut best_len = 0;
    let mut best_count = 0usize;
    let mut count = 0usize;
    for (i, unit) in units.iter().enumerate() {
        if i > 0 && unit.len > units[i - 1].len {
            count = 0;
        }
        count += 1;
        if count > best_count {
            best_count = count;
            best_len = unit.len;
        }
    }
    best_len
}

/// The most common distinct unit of length `len`, per `mainBeg`.
fn main_beg(units: &[RepeatUnit], len: usize, seq: &[u8]) -> usize {
    let mut best_beg = 0usize;
    let mut best_count = 0usize;
    let mut count = 0usize;
    for (i, unit) in units.iter().enumerate() {
        if unit.len != len {
            continue;
        }
        if count > 0 && seq[units[i - 1].beg..units[i - 1].beg + len] != seq[unit.beg..unit.beg + len] {
            count = 0;
        }
        count += 1;
        if count < best_count {
            continue;
        }
        if count > best_count || unit.beg < best_beg {
            best_count = count;
            best_beg = unit.beg;
        }
    }
    best_beg
}

fn decode_one(alphabet: &Alphabet, code: u8) -> u8 {
    alphabet.decode(&[code])[0]
}

fn store_sequence(alphabet: &Alphabet, codes: &[u8]) -> String {
    String::from_utf8(alphabet.decode(codes)).expect("decoded alphabet letters are ASCII")
}

fn raw_state(state: State, w: usize) -> usize {
    match state {
        State::Background => 0,
        State::Foreground(k) => k,
        State::Insertion(k) => w + k,
    }
}

#[allow(clippy::too_many_arguments)]
fn finish_repeat(
    seq_name: &str,
    seq: &[u8],
    alphabet: &Alphabet,
    rep_beg: usize,
    rep_end: usize,
    rep_text: &str,
    rep_units: &mut [RepeatUnit],
    comma_pos: usize,
    final_offset: usize,
    min_copy_number: f64,
) -> Option<RepeatRecord> {
    let repeat_count = rep_text.matches(',').count() as f64;
    let copy_number = repeat_count + (rep_end - comma_pos) as f64 / final_offset as f64;
    if copy_number < min_copy_number {
        return None;
    }

    sort_units(rep_units, seq);
    let period = main_len(rep_units);
    let consensus_beg = main_beg(rep_units, period, seq);
    let consensus_unit = store_sequence(alphabet, &seq[consensus_beg..consensus_beg + period]);

    Some(RepeatRecord {
        seq_name: seq_name.to_owned(),
        start: rep_beg,
        end: rep_end,
        period,
        copy_number,
        consensus_unit,
        annotated_text: rep_text.to_owned(),
    })
}

/// Drives `finder` over `seq` (already alphabet-encoded) to completion,
/// consuming its state stream (spec §4.5) into [`RepeatRecord`]s, per
/// `findRepeatsInOneSequence`.
pub fn find_repeats(
    seq_name: &str,
    seq: &[u8],
    finder: &mut RepeatFinder,
    alphabet: &Alphabet,
    max_repeat_offset: usize,
    min_copy_number: f64,
) -> Vec<RepeatRecord> {
    finder.calc_best_path_score(seq);

    let mut records = Vec::new();
    let mut rep_units: Vec<RepeatUnit> = Vec::new();
    let mut rep_text = String::new();
    let mut rep_beg = 0usize;
    let mut comma_pos = 0usize;
    let mut state = 0usize;

    for seq_pos in 0..seq.len() {
        let new_state = raw_state(finder.next_state(), max_repeat_offset);

        if new_state == 0 {
            if state > 0 {
                if let Some(record) = finish_repeat(
                    seq_name, seq, alphabet, rep_beg, seq_pos, &rep_text, &mut rep_units, comma_pos, state, min_copy_number,
                ) {
                    records.push(record);
                }
            }
        } else if new_state <= max_repeat_offset {
            if state == 0 {
                rep_units.clear();
                rep_beg = seq_pos - new_state;
                rep_text = store_sequence(alphabet, &seq[rep_beg..seq_pos]);
                comma_pos = rep_beg;
            } else if state <= max_repeat_offset {
                for i in (new_state + 1..=state).rev() {
                    if seq_pos - comma_pos >= i {
                        rep_text.push(',');
                        comma_pos = seq_pos;
                    }
                    rep_text.push('-');
                }
            }
            rep_units.push(RepeatUnit { beg: seq_pos - new_state, len: new_state });
            if seq_pos - comma_pos >= new_state {
                rep_text.push(',');
                comma_pos = seq_pos;
            }
            rep_text.push(decode_one(alphabet, seq[seq_pos]).to_ascii_uppercase() as char);
        } else {
            rep_text.push(decode_one(alphabet, seq[seq_pos]).to_ascii_lowercase() as char);
        }

        state = new_state;
    }

    if state > 0 {
        if let Some(record) = finish_repeat(
            seq_name,
            seq,
            alphabet,
            rep_beg,
            seq.len(),
            &rep_text,
            &mut rep_units,
            comma_pos,
            state,
            min_copy_number,
        ) {
            records.push(record);
        }
    }

    records
}

/// Writes per-position posterior probabilities as a two-column TSV
/// (`position`, `probability`), one sequence's worth at a time.
pub fn write_probabilities(seq_name: &str, probabilities: &[f32], out: &mut impl Write) -> io::Result<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').has_headers(false).from_writer(out);
    writer.write_record([seq_name, "position", "probability"])?;
    for (i, &p) in probabilities.iter().enumerate() {
        writer.write_record([seq_name.to_owned(), i.to_string(), p.to_string()])?;
    }
    writer.flush()
}

/// A 256-entry table from encoded symbol to its masked replacement,
/// per `initMaskTable`: every "normal" letter maps to `mask_symbol`'s code
/// (hard masking) unless `mask_symbol` is `None`, in which case every
/// letter maps to its own lowercase form (soft masking).
pub fn build_mask_table(alphabet: &Alphabet, mask_symbol: Option<u8>) -> [u8; 256] {
    let mut table = [0u8; 256];
    match mask_symbol {
        Some(symbol) => {
            let code = alphabet.encode(&[symbol]).expect("mask symbol must be in the alphabet")[0];
            table.fill(code);
        }
        None => {
            for (code, slot) in table.iter_mut().enumerate() {
                let letter = alphabet.decode(&[code as u8])[0];
                *slot = alphabet.encode(&[letter.to_ascii_lowercase()]).map(|v| v[0]).unwrap_or(code as u8);
            }
        }
    }
    table
}

/// Running totals behind `writeCounts`'s best-fit summary: `counts[0]` is
/// expected background-to-background transitions, `counts[k]` expected
/// entries into foreground period `k`.
#[derive(Debug, Clone)]
pub struct TransitionSummary {
    pub counts: Vec<f64>,
    pub total_transitions: f64,
}

impl TransitionSummary {
    pub fn new(max_repeat_offset: usize) -> Self {
        TransitionSummary { counts: vec![0.0; max_repeat_offset + 1], total_transitions: 0.0 }
    }

    pub fn add_sequence(&mut self, seq_len: usize) {
        self.total_transitions += seq_len as f64 + 1.0;
    }

    pub fn write(&self, out: &mut impl Write) -> io::Result<()> {
        let bg2bg = self.counts[0];
        writeln!(out, "#period\testimated number of tracts")?;
        let mut repeat_count_sum = 0.0;
        let mut weighted_sum = 0.0;
        for (period, &count) in self.counts.iter().enumerate().skip(1) {
            writeln!(out, "{}\t{}", period, count)?;
            repeat_count_sum += count;
            weighted_sum += period as f64 * count;
        }

        writeln!(out, "# estimated total number of repetitive tracts: {}", repeat_count_sum)?;
        writeln!(out, "# estimated number of background-to-background transitions: {}", bg2bg)?;
        writeln!(
            out,
            "# total number of transitions (#letters + #sequences): {}",
            self.total_transitions
        )?;

        let prob_decay = 1.0 - repeat_count_sum / weighted_sum;
        writeln!(out, "# best-fit probability decay per period: {}", prob_decay)?;

        let repeat_prob = repeat_count_sum / (repeat_count_sum + bg2bg);
        writeln!(out, "# best-fit probability of a repeat starting per position: {}", repeat_prob)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::ParamsBuilder;

    #[test]
    fn test_bed_intervals_merges_contiguous_runs() {
        let probs = [0.1, 0.9, 0.95, 0.2, 0.8];
        let intervals = bed_intervals(&probs, 0.5, "chr1");
        assert_eq!(
            intervals,
            vec![
                MaskedInterval { seq_name: "chr1".to_owned(), start: 1, end: 3 },
                MaskedInterval { seq_name: "chr1".to_owned(), start: 4, end: 5 },
            ]
        );
    }

    #[test]
    fn test_bed_intervals_open_run_closes_at_end() {
        let probs = [0.9, 0.9];
        let intervals = bed_intervals(&probs, 0.5, "chr1");
        assert_eq!(intervals, vec![MaskedInterval { seq_name: "chr1".to_owned(), start: 0, end: 2 }]);
    }

    #[test]
    fn test_build_mask_table_hard_mask_maps_every_code_to_symbol() {
        let alphabet = Alphabet::dna();
        let table = build_mask_table(&alphabet, Some(b'N'));
        let n_code = alphabet.encode(b"N").unwrap()[0];
        for &code in alphabet.encode(b"ACGT").unwrap().iter() {
            assert_eq!(table[code as usize], n_code);
        }
    }

    #[test]
    fn test_build_mask_table_soft_mask_lowercases() {
        let alphabet = Alphabet::dna();
        let table = build_mask_table(&alphabet, None);
        let a_code = alphabet.encode(b"A").unwrap()[0];
        let a_lower_code = alphabet.encode(b"a").unwrap()[0];
        assert_eq!(table[a_code as usize], a_lower_code);
    }

    #[test]
    fn test_find_repeats_reports_a_perfect_dinucleotide_tract() {
        let alphabet = Alphabet::dna();
        let params = ParamsBuilder::default().max_repeat_offset(4).build().unwrap();
        let mut table = ndarray::Array2::from_elem((4, 4), 0.2);
        for i in 0..4 {
            table[[i, i]] = 3.0;
        }
        let emissions = crate::model::emission::EmissionTable::new(table);
        let mut finder = RepeatFinder::new(params, emissions);

        let seq = alphabet.encode(b"ACACACACACACACACACAC").unwrap();
        let records = find_repeats("chr1", &seq, &mut finder, &alphabet, 4, 1.0);

        assert!(records.iter().any(|r| r.period == 2), "expected a reported period-2 repeat, got {:?}", records);
    }
}
