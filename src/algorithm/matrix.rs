use std::{
    ops::Range,
    time::{Duration, Instant},
};

use tracing::debug;

use super::{
    candidates::CandidateMap,
    cell_matches, check_pair,
    indices::{Coordinate, Subset},
    scoring::{next_cell, Cell, Score, ScoreParams},
    Executor, Progress,
};
use crate::{error::AlignmentError, token::TokenSequence};

/// Non-zero cells only, one row per `x`, kept sorted by `y`.
#[derive(Clone, Debug, Default)]
struct ScoreTable {
    rows: Vec<Vec<(usize, Cell)>>,
}

impl ScoreTable {
    fn new(row_count: usize) -> ScoreTable {
        ScoreTable {
            rows: vec![vec![]; row_count],
        }
    }

    fn get(&self, coordinate: Coordinate) -> Cell {
        let Some(row) = self.rows.get(coordinate.x) else {
            return Cell::ZERO;
        };
        match row.binary_search_by_key(&coordinate.y, |&(y, _)| y) {
            Ok(index) => row[index].1,
            Err(_) => Cell::ZERO,
        }
    }

    fn replace_row_range(&mut self, x: usize, columns: Range<usize>, entries: Vec<(usize, Cell)>) {
        let row = &mut self.rows[x];
        let start = row.partition_point(|&(y, _)| y < columns.start);
        let end = row.partition_point(|&(y, _)| y < columns.end);
        row.splice(start..end, entries);
    }
}

/// Exhaustive whole-matrix alignment: rescan, claim the best chain, repeat until nothing is left.
pub struct AlignmentMatrix {
    sequences: [TokenSequence; 2],
    params: ScoreParams,
    whole: Subset,
    table: ScoreTable,
    matched_pairs: u64,
    finished: bool,
}

impl AlignmentMatrix {
    pub fn new(sequences: [TokenSequence; 2], params: ScoreParams, max_cells: u64) -> Result<Self, AlignmentError> {
        check_pair(&sequences)?;
        params.validate()?;
        let [m, n] = [sequences[0].len(), sequences[1].len()];
        let cells = (m as u64 + 1).saturating_mul(n as u64 + 1);
        if cells > max_cells {
            return Err(AlignmentError::OversizedComparison {
                cells,
                limit: max_cells,
            });
        }
        let whole = Subset::whole(m, n)
            .ok_or_else(|| AlignmentError::invariant(Coordinate::new(m, n), "non-empty sequences gave no cells"))?;
        // Sequences restored mid-run already carry the pairs claimed before.
        let matched_pairs = sequences[0].invalid_count() as u64;
        Ok(AlignmentMatrix {
            sequences,
            params,
            whole,
            table: ScoreTable::new(m + 1),
            matched_pairs,
            finished: false,
        })
    }

    pub fn into_sequences(self) -> [TokenSequence; 2] {
        self.sequences
    }

    pub fn score(&self, coordinate: Coordinate) -> Score {
        self.table.get(coordinate).s
    }

    fn tokens_match(&self, coordinate: Coordinate) -> bool {
        cell_matches([&self.sequences[0], &self.sequences[1]], coordinate)
    }

    /// Recomputes every cell of `subset` in scan order, reading cells outside it from the
    /// previous scan, and returns the candidates found.
    pub fn compute_subset(&mut self, subset: &Subset) -> CandidateMap {
        debug_assert!(self.whole.contains(subset.origin()));
        let mut candidates = CandidateMap::new();
        let (origin, max) = (subset.origin(), subset.max());
        for x in origin.x..max.x {
            let mut entries = vec![];
            let mut west = self.table.get(Coordinate::new(x, origin.y - 1));
            for y in origin.y..max.y {
                let coordinate = Coordinate::new(x, y);
                let (cell, _) = next_cell(
                    &self.params,
                    self.tokens_match(coordinate),
                    self.table.get(coordinate.north_west()),
                    self.table.get(coordinate.north()),
                    west,
                );
                if cell.is_candidate(&self.params) {
                    candidates.insert(cell.s, coordinate);
                }
                if cell.s > 0 {
                    entries.push((y, cell));
                }
                west = cell;
            }
            self.table.replace_row_range(x, origin.y..max.y, entries);
        }
        candidates
    }

    /// Every matching cell of the chain ending at `end`, walking back from it.
    pub fn match_coordinates(&self, end: Coordinate) -> Result<Vec<Coordinate>, AlignmentError> {
        if !self.whole.contains(end) {
            return Err(AlignmentError::invariant(end, "chain end lies outside the matrix"));
        }
        if self.score(end) == 0 {
            return Err(AlignmentError::invariant(end, "chain walk started from a zero-score cell"));
        }

        let mut coordinates = vec![];
        let mut current = end;
        loop {
            let next = if self.tokens_match(current) {
                coordinates.push(current);
                current.north_west()
            } else {
                let mut best = current.north_west();
                for neighbour in [current.north(), current.west()] {
                    if self.score(neighbour) > self.score(best) {
                        best = neighbour;
                    }
                }
                best
            };
            if self.score(next) == 0 {
                break;
            }
            current = next;
        }
        Ok(coordinates)
    }

    pub fn invalidate(&mut self, coordinates: &[Coordinate]) {
        for coordinate in coordinates {
            let [a, b] = coordinate.token_indices();
            self.sequences[0].invalidate(a);
            self.sequences[1].invalidate(b);
            self.matched_pairs += 1;
        }
    }

    /// One scan-and-claim round. Returns false once a scan finds no candidate.
    fn claim_best_chain(&mut self) -> Result<bool, AlignmentError> {
        let whole = self.whole;
        let candidates = self.compute_subset(&whole);
        let Some((score, end)) = candidates.best() else {
            return Ok(false);
        };
        let chain = self.match_coordinates(end)?;
        if chain.is_empty() {
            return Err(AlignmentError::invariant(end, "candidate chain holds no matching cell"));
        }
        debug!(score, length = chain.len(), "claiming chain ending at {end}");
        self.invalidate(&chain);
        Ok(true)
    }
}

impl Executor for AlignmentMatrix {
    fn step(&mut self, budget: Duration) -> Result<Progress, AlignmentError> {
        let started = Instant::now();
        while !self.finished {
            if !self.claim_best_chain()? {
                self.finished = true;
                self.table = ScoreTable::default();
            }
            if started.elapsed() >= budget {
                break;
            }
        }
        Ok(self.progress())
    }

    fn progress(&self) -> Progress {
        let total_work = self.sequences[0].len().min(self.sequences[1].len()) as u64 + 1;
        let done_work = if self.finished { total_work } else { self.matched_pairs };
        Progress::new(total_work, done_work)
    }

    fn sequences(&self) -> [&TokenSequence; 2] {
        [&self.sequences[0], &self.sequences[1]]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::token::{sequence_of, Interner, TokenIndex, TokenType};

    fn params(threshold: Score) -> ScoreParams {
        ScoreParams {
            threshold,
            drop_off: threshold,
            ..ScoreParams::default()
        }
    }

    fn matrix(interner: &Interner, a: &[&str], b: &[&str], threshold: Score) -> AlignmentMatrix {
        let sequences = [sequence_of(interner, a), sequence_of(interner, b)];
        AlignmentMatrix::new(sequences, params(threshold), u64::MAX).unwrap()
    }

    fn validity(sequence: &TokenSequence) -> Vec<bool> {
        sequence.iter().map(|token| token.valid).collect()
    }

    #[test]
    fn first_scan_candidates() {
        let interner = Interner::new();
        let mut matrix = matrix(&interner, &["the", "cat", "sat"], &["the", "dog", "sat"], 1);
        let whole = Subset::whole(3, 3).unwrap();
        let candidates = matrix.compute_subset(&whole);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates.at(1), &[Coordinate::new(1, 1), Coordinate::new(3, 3)]);
        assert_eq!(candidates.best(), Some((1, Coordinate::new(1, 1))));
    }

    #[test]
    fn claims_the_and_sat() {
        let interner = Interner::new();
        let mut matrix = matrix(&interner, &["the", "cat", "sat"], &["the", "dog", "sat"], 1);
        let progress = matrix.step(Duration::MAX).unwrap();
        assert!(progress.is_complete());
        let [a, b] = matrix.into_sequences();
        assert_eq!(validity(&a), vec![false, true, false]);
        assert_eq!(validity(&b), vec![false, true, false]);
    }

    #[test]
    fn repeated_pattern_scores() {
        let interner = Interner::new();
        let mut matrix = matrix(&interner, &["a", "b", "a", "b"], &["a", "b", "a", "b"], 2);
        let candidates = matrix.compute_subset(&Subset::whole(4, 4).unwrap());
        assert_eq!(candidates.best(), Some((4, Coordinate::new(4, 4))));
        assert_eq!(matrix.table.get(Coordinate::new(4, 4)), Cell { s: 4, m: 3 });
        assert_eq!(matrix.table.get(Coordinate::new(2, 3)), Cell { s: 1, m: 2 });
        let chain = matrix.match_coordinates(Coordinate::new(4, 4)).unwrap();
        assert_eq!(
            chain,
            vec![
                Coordinate::new(4, 4),
                Coordinate::new(3, 3),
                Coordinate::new(2, 2),
                Coordinate::new(1, 1),
            ]
        );
    }

    #[test]
    fn walk_from_zero_cell_is_an_invariant_violation() {
        let interner = Interner::new();
        let mut matrix = matrix(&interner, &["a", "b"], &["c", "d"], 1);
        matrix.compute_subset(&Subset::whole(2, 2).unwrap());
        let result = matrix.match_coordinates(Coordinate::new(2, 2));
        assert!(matches!(result, Err(AlignmentError::InternalInvariantViolation { .. })));
        let result = matrix.match_coordinates(Coordinate::new(5, 1));
        assert!(matches!(result, Err(AlignmentError::InternalInvariantViolation { .. })));
    }

    #[test]
    fn walk_skips_mismatched_cells() {
        let interner = Interner::new();
        let a = ["p", "q", "r", "x", "s", "t"];
        let b = ["p", "q", "r", "s", "t"];
        let mut matrix = matrix(&interner, &a, &b, 3);
        let candidates = matrix.compute_subset(&Subset::whole(6, 5).unwrap());
        assert_eq!(candidates.best(), Some((4, Coordinate::new(6, 5))));
        let chain = matrix.match_coordinates(Coordinate::new(6, 5)).unwrap();
        let expected = [(6, 5), (5, 4), (3, 3), (2, 2), (1, 1)].map(|(x, y)| Coordinate::new(x, y));
        assert_eq!(chain, expected);
    }

    #[test]
    fn rejects_oversized_and_empty_input() {
        let interner = Interner::new();
        let sequences = [sequence_of(&interner, &["a", "b"]), sequence_of(&interner, &["a"])];
        let result = AlignmentMatrix::new(sequences.clone(), ScoreParams::default(), 5);
        assert_eq!(result.err(), Some(AlignmentError::OversizedComparison { cells: 6, limit: 5 }));

        let empty = [sequence_of(&interner, &[]), sequence_of(&interner, &["a"])];
        let result = AlignmentMatrix::new(empty, ScoreParams::default(), u64::MAX);
        assert_eq!(result.err(), Some(AlignmentError::EmptySequence { side: "left" }));
    }

    #[test]
    fn rejects_type_mismatch() {
        let interner = Interner::new();
        let lines = TokenSequence::from_lexemes(TokenType::Line, [interner.intern("a")]);
        let words = sequence_of(&interner, &["a"]);
        let result = AlignmentMatrix::new([lines, words], ScoreParams::default(), u64::MAX);
        assert_eq!(
            result.err(),
            Some(AlignmentError::TokenTypeMismatch {
                left: TokenType::Line,
                right: TokenType::Whitespace
            })
        );
    }

    #[test]
    fn progress_is_monotonic_per_chain() {
        let interner = Interner::new();
        let a = ["a", "b", "c", "d", "x", "e", "f", "g", "h"];
        let b = ["e", "f", "g", "h", "y", "a", "b", "c", "d"];
        let mut matrix = matrix(&interner, &a, &b, 4);
        let mut last = matrix.progress();
        assert_eq!(last, Progress::new(10, 0));
        while !last.is_complete() {
            let progress = matrix.step(Duration::ZERO).unwrap();
            assert!(progress.done_work >= last.done_work);
            last = progress;
        }
        assert_eq!(matrix.sequences()[0].invalid_count(), 8);
        assert!(matrix.sequences()[0][TokenIndex::new(4)].valid);
    }
}
