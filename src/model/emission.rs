//! C1 (emission table) and C6 (emission policy) of spec §4.1/§4.2.

use ndarray::Array2;

/// Read-only table mapping (encoded symbol, encoded symbol) to a likelihood
/// ratio. Values are linear ratios for the forward/backward engine, natural
/// logs of the same ratios for the Viterbi engine (spec §3, "Emission
/// table").
#[derive(Debug, Clone)]
pub struct EmissionTable {
    /// `table[x][y]`: ratio of observing `x` given a foreground copy of `y`.
    table: Array2<f64>,
}

impl EmissionTable {
    /// Build a table directly from a dense matrix, already in the target
    /// space (linear or log) the caller intends to use it in.
    pub fn new(table: Array2<f64>) -> Self {
        EmissionTable { table }
    }

    /// Build the linear-space table from an integer scoring matrix and a
    /// scale factor `lambda`, via `E[x][y] = exp(lambda * score[x][y])`
    /// (spec glossary, "lambda").
    pub fn from_scores(scoring: &Array2<i32>, lambda: f64) -> Self {
        let table = scoring.mapv(|s| (lambda * s as f64).exp());
        EmissionTable { table }
    }

    /// The log-space dual, `ln(E[x][y])`, for the Viterbi engine.
    pub fn to_log_space(&self) -> Self {
        EmissionTable {
            table: self.table.mapv(f64::ln),
        }
    }

    #[inline]
    pub fn ratio(&self, x: u8, y: u8) -> f64 {
        self.table[[x as usize, y as usize]]
    }

    pub fn alphabet_size(&self) -> usize {
        self.table.nrows()
    }
}

/// C6, probability-space branch: multiply each foreground slot `fg[k-1]`
/// (`k` in `1..=min(p, w)`) by `E[seq[p]][seq[p-k]]`; zero out slots beyond
/// the left edge (spec §4.2). Background and gap states are untouched by
/// emission, so `fg` is the only vector this function sees.
pub fn apply_emission_prob(emissions: &EmissionTable, seq: &[u8], p: usize, w: usize, fg: &mut [f64]) {
    debug_assert_eq!(fg.len(), w);
    let max_offset = p.min(w);
    let s = seq[p];
    for k in 1..=max_offset {
        fg[k - 1] *= emissions.ratio(s, seq[p - k]);
    }
    for slot in fg.iter_mut().skip(max_offset) {
        *slot = 0.0;
    }
}

/// C6, log-space branch: add `ln E[seq[p]][seq[p-k]]` into `fg[k-1]`; slots
/// beyond the left edge become `-inf`. Because `x + (-inf) == -inf` for any
/// finite `x`, setting the out-of-range slots to `-inf` via addition (rather
/// than assignment) is equivalent and keeps the two branches structurally
/// parallel.
pub fn apply_emission_log(emissions: &EmissionTable, seq: &[u8], p: usize, w: usize, fg: &mut [f64]) {
    debug_assert_eq!(fg.len(), w);
    let max_offset = p.min(w);
    let s = seq[p];
    for k in 1..=max_offset {
        fg[k - 1] += emissions.ratio(s, seq[p - k]);
    }
    for slot in fg.iter_mut().skip(max_offset) {
        *slot = std::f64::NEG_INFINITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_from_scores_identity() {
        let scoring = arr2(&[[1, -1], [-1, 1]]);
        let table = EmissionTable::from_scores(&scoring, 1.0);
        assert_relative_eq!(table.ratio(0, 0), 1f64.exp());
        assert_relative_eq!(table.ratio(0, 1), (-1f64).exp());
    }

    #[test]
    fn test_apply_emission_prob_edge() {
        let table = EmissionTable::new(arr2(&[[1.0, 0.5], [0.5, 1.0]]));
        let seq = [0u8, 1, 0, 0];
        let mut fg = vec![1.0, 1.0];
        // p = 1, w = 2: only offset 1 is available; offset 2 runs off the sequence.
        apply_emission_prob(&table, &seq, 1, 2, &mut fg);
        assert_eq!(fg[0], table.ratio(seq[1], seq[0]));
        assert_eq!(fg[1], 0.0);
    }

    #[test]
    fn test_apply_emission_log_edge() {
        let table = EmissionTable::new(arr2(&[[1.0, 0.5], [0.5, 1.0]])).to_log_space();
        let seq = [0u8, 1, 0, 0];
        let mut fg = vec![0.0, 0.0];
        apply_emission_log(&table, &seq, 1, 2, &mut fg);
        assert_eq!(fg[0], table.ratio(seq[1], seq[0]));
        assert_eq!(fg[1], std::f64::NEG_INFINITY);
    }
}
