use serde::{Deserialize, Serialize};

use crate::algorithm::scoring::{Cell, Direction, Score, ScoreParams, MAX_TERMINUS};

const SCORE_MASK: u32 = 0xffff;
const DIRECTION_SHIFT: u32 = 16;
const DIRECTION_MASK: u32 = 0b11;
const TERMINUS_SHIFT: u32 = 18;

/// One tile cell in 32 bits: `score: u16`, `direction: u2`, `terminus: u14`.
///
/// The terminus is how far the cell sits below its chain's running peak, offset by the match
/// score: `terminus = m + match - s`. A cell that just raised its chain to a new peak therefore
/// reads below `match`, and a zero-score cell is all zeroes. Scores saturate at `u16::MAX`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Packed(u32);

impl Packed {
    pub const ZERO: Packed = Packed(0);

    pub fn encode(cell: Cell, direction: Direction, params: &ScoreParams) -> Packed {
        let score = cell.s.min(SCORE_MASK);
        if score == 0 {
            return Packed::ZERO;
        }
        let terminus = (cell.m + params.match_score).saturating_sub(score).min(MAX_TERMINUS);
        let direction = match direction {
            Direction::None => 0,
            Direction::North => 1,
            Direction::West => 2,
            Direction::NorthWest => 3,
        };
        Packed(score | (direction << DIRECTION_SHIFT) | (terminus << TERMINUS_SHIFT))
    }

    pub fn decode(self, params: &ScoreParams) -> (Cell, Direction) {
        let s = self.score();
        let m = if s == 0 {
            0
        } else {
            (s + self.terminus()).saturating_sub(params.match_score)
        };
        (Cell { s, m }, self.direction())
    }

    pub fn score(self) -> Score {
        self.0 & SCORE_MASK
    }

    pub fn direction(self) -> Direction {
        match (self.0 >> DIRECTION_SHIFT) & DIRECTION_MASK {
            1 => Direction::North,
            2 => Direction::West,
            3 => Direction::NorthWest,
            _ => Direction::None,
        }
    }

    pub fn terminus(self) -> u32 {
        self.0 >> TERMINUS_SHIFT
    }

    pub fn is_candidate(self, params: &ScoreParams) -> bool {
        self.score() >= params.threshold && self.terminus() < params.match_score
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_cell_is_all_zero_bits() {
        let params = ScoreParams::default();
        assert_eq!(Packed::encode(Cell::ZERO, Direction::None, &params), Packed::ZERO);
        assert_eq!(Packed::ZERO.decode(&params), (Cell::ZERO, Direction::None));
    }

    #[test]
    fn fields_land_in_their_bits() {
        let params = ScoreParams::default();
        let packed = Packed::encode(Cell { s: 4, m: 6 }, Direction::West, &params);
        assert_eq!(packed.score(), 4);
        assert_eq!(packed.direction(), Direction::West);
        assert_eq!(packed.terminus(), 3);
        assert_eq!(packed.decode(&params), (Cell { s: 4, m: 6 }, Direction::West));
    }

    #[test]
    fn candidate_agrees_with_cell() {
        let params = ScoreParams {
            match_score: 2,
            skip_penalty: 1,
            threshold: 3,
            drop_off: 3,
        };
        // Reachable cells satisfy m + match >= s.
        for (s, m) in [(3, 1), (4, 2), (4, 4), (5, 4), (2, 0), (6, 9)] {
            let cell = Cell { s, m };
            let packed = Packed::encode(cell, Direction::NorthWest, &params);
            assert_eq!(packed.is_candidate(&params), cell.is_candidate(&params), "{cell:?}");
            assert_eq!(packed.decode(&params).0, cell);
        }
    }

    #[test]
    fn score_saturates() {
        let params = ScoreParams::default();
        let packed = Packed::encode(Cell { s: 70_000, m: 69_999 }, Direction::NorthWest, &params);
        assert_eq!(packed.score(), u16::MAX as u32);
    }
}
