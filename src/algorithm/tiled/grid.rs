use std::ops::{Index, IndexMut};

use rayon::prelude::*;

use super::packed::Packed;
use crate::{
    algorithm::{
        cell_matches,
        indices::Coordinate,
        scoring::{next_cell, Direction, ScoreParams},
    },
    token::TokenSequence,
};

/// Anti-diagonals shorter than this are not worth handing to the thread pool.
const PARALLEL_DIAGONAL: usize = 64;

/// Placement of one tile. Local `(i, j)` is global `(x0 - 1 + i, y0 - 1 + j)`; local row and
/// column 0 hold the inbound edge state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct TileSpan {
    pub row: usize,
    pub col: usize,
    pub x0: usize,
    pub y0: usize,
    pub height: usize,
    pub width: usize,
    pub east_far: bool,
    pub south_far: bool,
}

impl TileSpan {
    pub fn global(&self, i: usize, j: usize) -> Coordinate {
        Coordinate::new(self.x0 - 1 + i, self.y0 - 1 + j)
    }
}

/// Step from a local cell along its stored direction.
pub(super) fn predecessor(i: usize, j: usize, direction: Direction) -> Option<(usize, usize)> {
    match direction {
        Direction::None => None,
        Direction::North => Some((i - 1, j)),
        Direction::West => Some((i, j - 1)),
        Direction::NorthWest => Some((i - 1, j - 1)),
    }
}

pub(super) struct TileInput<'a> {
    pub span: TileSpan,
    pub sequences: [&'a TokenSequence; 2],
    pub params: &'a ScoreParams,
}

impl TileInput<'_> {
    pub fn matched(&self, i: usize, j: usize) -> bool {
        cell_matches(self.sequences, self.span.global(i, j))
    }
}

/// Bounded `(height + 1) x (width + 1)` buffer of packed cells.
#[derive(Clone)]
pub(super) struct TileGrid {
    width: usize,
    cells: Vec<Packed>,
}

impl TileGrid {
    pub fn new(height: usize, width: usize) -> Self {
        TileGrid {
            width: width + 1,
            cells: vec![Packed::ZERO; (height + 1) * (width + 1)],
        }
    }

    pub fn flat_index(&self, i: usize, j: usize) -> usize {
        i * self.width + j
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    fn cell_at(&self, input: &TileInput, i: usize, j: usize) -> Packed {
        let params = input.params;
        let decode = |i: usize, j: usize| self[(i, j)].decode(params).0;
        let (cell, direction) = next_cell(
            params,
            input.matched(i, j),
            decode(i - 1, j - 1),
            decode(i - 1, j),
            decode(i, j - 1),
        );
        Packed::encode(cell, direction, params)
    }

    pub fn compute_sequential(&mut self, input: &TileInput) {
        for i in 1..=input.span.height {
            for j in 1..=input.span.width {
                self[(i, j)] = self.cell_at(input, i, j);
            }
        }
    }

    /// Same cells as `compute_sequential`, one anti-diagonal at a time.
    pub fn compute_wavefront(&mut self, input: &TileInput) {
        let TileSpan { height, width, .. } = input.span;
        for diagonal in 2..=(height + width) {
            let first = diagonal.saturating_sub(width).max(1);
            let last = (diagonal - 1).min(height);
            if last + 1 - first < PARALLEL_DIAGONAL {
                for i in first..=last {
                    self[(i, diagonal - i)] = self.cell_at(input, i, diagonal - i);
                }
                continue;
            }
            let grid: &TileGrid = self;
            let values: Vec<Packed> = (first..=last)
                .into_par_iter()
                .map(|i| grid.cell_at(input, i, diagonal - i))
                .collect();
            for (i, value) in (first..=last).zip(values) {
                self[(i, diagonal - i)] = value;
            }
        }
    }
}

impl Index<(usize, usize)> for TileGrid {
    type Output = Packed;

    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        &self.cells[i * self.width + j]
    }
}

impl IndexMut<(usize, usize)> for TileGrid {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        &mut self.cells[i * self.width + j]
    }
}
