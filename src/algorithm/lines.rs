//! Whole-token comparison without the recurrence: every token whose content occurs anywhere on
//! both sides is claimed on both sides, however often it occurs on each. Meant for line tokens,
//! where it counts copied lines regardless of their order.

use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::debug;

use super::{check_pair, Executor, Progress};
use crate::{
    error::AlignmentError,
    token::{Lexeme, TokenIndex, TokenSequence},
};

pub struct LineComparison {
    sequences: [TokenSequence; 2],
    finished: bool,
}

impl LineComparison {
    pub fn new(sequences: [TokenSequence; 2]) -> Result<LineComparison, AlignmentError> {
        check_pair(&sequences)?;
        Ok(LineComparison {
            sequences,
            finished: false,
        })
    }

    /// Valid tokens per lexeme on each side.
    fn occurrences(&self) -> FxHashMap<Lexeme, [usize; 2]> {
        let mut counts: FxHashMap<Lexeme, [usize; 2]> = FxHashMap::default();
        for (side, sequence) in self.sequences.iter().enumerate() {
            for token in sequence.iter().filter(|token| token.valid) {
                counts.entry(token.lexeme).or_default()[side] += 1;
            }
        }
        counts
    }

    fn claim_shared(&mut self) -> [usize; 2] {
        let counts = self.occurrences();
        let shared = |lexeme: &Lexeme| counts.get(lexeme).map_or(false, |&[a, b]| a > 0 && b > 0);
        let mut claimed = [0; 2];
        for (side, sequence) in self.sequences.iter_mut().enumerate() {
            let indices: Vec<TokenIndex> = sequence
                .iter()
                .enumerate()
                .filter(|(_, token)| token.valid && shared(&token.lexeme))
                .map(|(index, _)| TokenIndex::new(index))
                .collect();
            claimed[side] = indices.len();
            for index in indices {
                sequence.invalidate(index);
            }
        }
        claimed
    }
}

impl Executor for LineComparison {
    fn step(&mut self, _budget: Duration) -> Result<Progress, AlignmentError> {
        if !self.finished {
            let claimed = self.claim_shared();
            debug!(left = claimed[0], right = claimed[1], "claimed shared lines");
            self.finished = true;
        }
        Ok(self.progress())
    }

    fn progress(&self) -> Progress {
        Progress::new(1, self.finished as u64)
    }

    fn sequences(&self) -> [&TokenSequence; 2] {
        [&self.sequences[0], &self.sequences[1]]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::token::{sequence_of, Interner};

    fn validity(sequence: &TokenSequence) -> Vec<bool> {
        sequence.iter().map(|token| token.valid).collect()
    }

    #[test]
    fn shared_lines_are_claimed_in_any_order() {
        let interner = Interner::new();
        let a = sequence_of(&interner, &["x = 1", "y = 2", "z = 3"]);
        let b = sequence_of(&interner, &["z = 3", "w = 4", "x = 1"]);
        let mut comparison = LineComparison::new([a, b]).unwrap();
        assert_eq!(comparison.progress(), Progress::new(1, 0));
        assert_eq!(comparison.step(Duration::ZERO).unwrap(), Progress::new(1, 1));
        let [a, b] = comparison.sequences();
        assert_eq!(validity(a), [false, true, false]);
        assert_eq!(validity(b), [false, true, false]);
    }

    #[test]
    fn repeats_are_claimed_on_each_side() {
        let interner = Interner::new();
        let a = sequence_of(&interner, &["}", "}", "}", "return;"]);
        let b = sequence_of(&interner, &["}", "break;"]);
        let mut comparison = LineComparison::new([a, b]).unwrap();
        comparison.step(Duration::ZERO).unwrap();
        let [a, b] = comparison.sequences();
        assert_eq!(a.invalid_count(), 3);
        assert_eq!(b.invalid_count(), 1);
    }

    #[test]
    fn claimed_tokens_do_not_count() {
        let interner = Interner::new();
        let mut a = sequence_of(&interner, &["p", "q"]);
        a.invalidate(TokenIndex::new(0));
        let b = sequence_of(&interner, &["p"]);
        let mut comparison = LineComparison::new([a, b]).unwrap();
        comparison.step(Duration::ZERO).unwrap();
        let [a, b] = comparison.sequences();
        assert_eq!(validity(a), [false, true]);
        assert_eq!(validity(b), [true]);
    }

    #[test]
    fn rejects_empty_input() {
        let interner = Interner::new();
        let sequences = [sequence_of(&interner, &[]), sequence_of(&interner, &["p"])];
        assert!(LineComparison::new(sequences).is_err());
    }
}
