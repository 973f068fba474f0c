use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::TokenIndex;

/// A cell of the DP space. `x` walks the left sequence, `y` the right one; both are 1-indexed
/// against token positions and row/column 0 is the zero border.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: usize,
    pub y: usize,
}

impl Coordinate {
    pub const fn new(x: usize, y: usize) -> Coordinate {
        Coordinate { x, y }
    }

    /// Token positions the cell compares. Only meaningful off the zero border.
    pub fn token_indices(self) -> [TokenIndex; 2] {
        [TokenIndex::new(self.x - 1), TokenIndex::new(self.y - 1)]
    }

    pub fn north_west(self) -> Coordinate {
        Coordinate::new(self.x - 1, self.y - 1)
    }

    pub fn north(self) -> Coordinate {
        Coordinate::new(self.x - 1, self.y)
    }

    pub fn west(self) -> Coordinate {
        Coordinate::new(self.x, self.y - 1)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Half-open rectangle `[origin, max)` over DP space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subset {
    origin: Coordinate,
    max: Coordinate,
}

impl Subset {
    pub fn new(origin: Coordinate, max: Coordinate) -> Option<Subset> {
        if origin.x < max.x && origin.y < max.y {
            Some(Subset { origin, max })
        } else {
            None
        }
    }

    /// Every non-border cell of an `m` by `n` comparison.
    pub fn whole(m: usize, n: usize) -> Option<Subset> {
        Subset::new(Coordinate::new(1, 1), Coordinate::new(m + 1, n + 1))
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    pub fn max(&self) -> Coordinate {
        self.max
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        (self.origin.x..self.max.x).contains(&coordinate.x) && (self.origin.y..self.max.y).contains(&coordinate.y)
    }
}
