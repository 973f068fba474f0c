use serde::{Deserialize, Serialize};

use crate::error::AlignmentError;

pub type Score = u32;

/// Largest terminus the tiled strategy's packed cell can hold.
pub(crate) const MAX_TERMINUS: u32 = (1 << 14) - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreParams {
    pub match_score: Score,
    pub skip_penalty: Score,
    /// Minimum score of a significant chain.
    pub threshold: Score,
    /// How far a chain may fall below its peak before it is dropped. Kept apart from `threshold`
    /// so that raising the threshold only ever removes candidates.
    pub drop_off: Score,
}

impl Default for ScoreParams {
    fn default() -> ScoreParams {
        ScoreParams {
            match_score: 1,
            skip_penalty: 1,
            threshold: 5,
            drop_off: 5,
        }
    }
}

impl ScoreParams {
    pub fn validate(&self) -> Result<(), AlignmentError> {
        if self.match_score == 0 || self.skip_penalty == 0 || self.threshold == 0 || self.drop_off == 0 {
            return Err(AlignmentError::InvalidParameters(format!(
                "match ({}), skip ({}), threshold ({}) and drop-off ({}) must all be positive",
                self.match_score, self.skip_penalty, self.threshold, self.drop_off
            )));
        }
        // The terminus of a live cell stays below `drop_off + match_score`.
        if self.drop_off.checked_add(self.match_score).map_or(true, |terminus| terminus > MAX_TERMINUS) {
            return Err(AlignmentError::InvalidParameters(format!(
                "drop-off {} with match {} does not fit a tile cell",
                self.drop_off, self.match_score
            )));
        }
        Ok(())
    }
}

/// Running chain score `s` and the masked peak `m` it is measured against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    pub s: Score,
    pub m: Score,
}

impl Cell {
    pub const ZERO: Cell = Cell { s: 0, m: 0 };

    pub fn is_candidate(&self, params: &ScoreParams) -> bool {
        self.s >= params.threshold && self.s > self.m
    }
}

/// Which neighbour a cell's score was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    None,
    /// `(x - 1, y)`
    North,
    /// `(x, y - 1)`
    West,
    /// `(x - 1, y - 1)`
    NorthWest,
}

/// One step of the recurrence. `matched` says whether both tokens of the cell are valid and equal.
///
/// Ties between predecessors resolve north-west first, then north, then west, which is also the
/// order chain walks follow.
pub fn next_cell(params: &ScoreParams, matched: bool, north_west: Cell, north: Cell, west: Cell) -> (Cell, Direction) {
    let (cell, direction) = if matched {
        let cell = Cell {
            s: north_west.s.saturating_add(params.match_score),
            m: north_west.s.max(north_west.m),
        };
        (cell, Direction::NorthWest)
    } else {
        let mut best = (north_west.s, Direction::NorthWest);
        for (s, direction) in [(north.s, Direction::North), (west.s, Direction::West)] {
            if s > best.0 {
                best = (s, direction);
            }
        }
        let s = best.0.saturating_sub(params.skip_penalty);
        if s == 0 {
            (Cell::ZERO, Direction::None)
        } else {
            let m = best.0.max(north_west.m).max(north.m).max(west.m);
            (Cell { s, m }, best.1)
        }
    };

    if cell.m.saturating_sub(cell.s) >= params.drop_off {
        (Cell::ZERO, Direction::None)
    } else {
        (cell, direction)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cell(s: Score, m: Score) -> Cell {
        Cell { s, m }
    }

    #[test]
    fn match_extends_diagonal() {
        let params = ScoreParams::default();
        let (next, direction) = next_cell(&params, true, cell(4, 2), cell(9, 0), cell(9, 0));
        assert_eq!(next, cell(5, 4));
        assert_eq!(direction, Direction::NorthWest);
        assert!(next.is_candidate(&params));
    }

    #[test]
    fn mismatch_decays_from_best_neighbour() {
        let params = ScoreParams::default();
        let (next, direction) = next_cell(&params, false, cell(1, 0), cell(2, 1), cell(3, 2));
        assert_eq!(next, cell(2, 3));
        assert_eq!(direction, Direction::West);
        assert!(!next.is_candidate(&params));
    }

    #[test]
    fn mismatch_ties_prefer_north_west() {
        let params = ScoreParams::default();
        let (_, direction) = next_cell(&params, false, cell(3, 0), cell(3, 0), cell(3, 0));
        assert_eq!(direction, Direction::NorthWest);
        let (_, direction) = next_cell(&params, false, cell(1, 0), cell(3, 0), cell(3, 0));
        assert_eq!(direction, Direction::North);
    }

    #[test]
    fn mismatch_to_zero_clears_mask() {
        let params = ScoreParams::default();
        let (next, direction) = next_cell(&params, false, cell(1, 7), cell(0, 0), cell(0, 0));
        assert_eq!(next, Cell::ZERO);
        assert_eq!(direction, Direction::None);
    }

    #[test]
    fn drop_off_resets_chain() {
        let params = ScoreParams {
            drop_off: 2,
            ..ScoreParams::default()
        };
        // Peak 3, decayed to 1: two below the peak reaches the tolerance.
        let (next, _) = next_cell(&params, false, cell(2, 3), cell(0, 0), cell(0, 0));
        assert_eq!(next, Cell::ZERO);
    }

    #[test]
    fn rejects_zero_params() {
        let params = ScoreParams {
            skip_penalty: 0,
            ..ScoreParams::default()
        };
        assert!(params.validate().is_err());
        assert!(ScoreParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_drop_off_that_overflows() {
        for drop_off in [MAX_TERMINUS, u32::MAX] {
            let params = ScoreParams {
                drop_off,
                ..ScoreParams::default()
            };
            assert!(params.validate().is_err(), "{drop_off}");
        }
        let params = ScoreParams {
            drop_off: MAX_TERMINUS - 1,
            ..ScoreParams::default()
        };
        assert!(params.validate().is_ok());
        let params = ScoreParams {
            threshold: u32::MAX,
            ..ScoreParams::default()
        };
        assert!(params.validate().is_ok());
    }
}
