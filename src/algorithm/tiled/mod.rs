//! Bounded-memory alignment: the matrix is solved one `tile_size x tile_size` tile at a time in
//! row-major order, and only the edges between tiles are kept.
//!
//! Chains that leave a tile through its east or south edge are not claimed there. Their cells are
//! left to the tile that sees the chain end, which learns about the chain through the trail stored
//! with the edge cell. A chain that dies without reaching a higher candidate is claimed from the
//! peak its trail carries. Claims made by later tiles do not reach back into finished tiles, so
//! results can differ from the exhaustive matrix when chains cross tile edges.

mod grid;
pub mod packed;
pub mod trail;

use std::{
    mem,
    time::{Duration, Instant},
};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use self::{
    grid::{predecessor, TileGrid, TileInput, TileSpan},
    trail::{EdgeCell, Peak, Trail, TrailArena, TrailId},
};
use super::{
    cell_matches, check_pair,
    indices::Coordinate,
    scoring::{Score, ScoreParams},
    Executor, Progress,
};
use crate::{error::AlignmentError, token::TokenSequence};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TileBackend {
    Sequential,
    /// Anti-diagonals of a tile are computed on the rayon pool.
    #[default]
    Wavefront,
}

/// Everything besides token validity that a tiled run needs to continue after a restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TiledCheckpoint {
    tile_size: usize,
    next_tile: usize,
    /// South edge of the previous tile row, indexed by `y`.
    north: Vec<EdgeCell>,
    /// South edge of the current tile row, filled as its tiles finish.
    next_north: Vec<EdgeCell>,
    /// East edge of the previous tile in the row, indexed by local row.
    west: Vec<EdgeCell>,
    trails: TrailArena,
}

impl TiledCheckpoint {
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn next_tile(&self) -> usize {
        self.next_tile
    }

    fn fresh(tile_size: usize, n: usize) -> TiledCheckpoint {
        TiledCheckpoint {
            tile_size,
            next_tile: 0,
            north: vec![EdgeCell::default(); n + 1],
            next_north: vec![EdgeCell::default(); n + 1],
            west: vec![EdgeCell::default(); tile_size + 1],
            trails: TrailArena::default(),
        }
    }
}

/// Inbound edges of the tile being solved.
struct Border<'a> {
    span: TileSpan,
    north: &'a [EdgeCell],
    west: &'a [EdgeCell],
}

impl Border<'_> {
    fn edge(&self, i: usize, j: usize) -> EdgeCell {
        if i == 0 {
            self.north[self.span.y0 - 1 + j]
        } else {
            self.west[i]
        }
    }

    /// Inbound edge cells the tile owns; the north-west corner belongs to the tile on the left.
    fn owned(&self) -> impl Iterator<Item = EdgeCell> + '_ {
        let span = self.span;
        (1..=span.width)
            .map(move |j| self.north[span.y0 - 1 + j])
            .chain((1..=span.height).map(move |i| self.west[i]))
    }
}

#[derive(Default)]
struct Walk {
    matched: Vec<Coordinate>,
    /// Best candidate passed, with its position in `matched`.
    peak: Option<(Score, Coordinate, usize)>,
    exit: Option<TrailId>,
}

/// Follows stored directions back from local `(i, j)` until the chain ends or leaves the tile.
fn walk(input: &TileInput, border: &Border, grid: &TileGrid, (mut i, mut j): (usize, usize)) -> Walk {
    let mut walk = Walk::default();
    loop {
        if i == 0 || j == 0 {
            walk.exit = border.edge(i, j).trail;
            break;
        }
        let cell = grid[(i, j)];
        if cell.score() == 0 {
            break;
        }
        if input.matched(i, j) {
            let coordinate = input.span.global(i, j);
            let score = cell.score();
            let better = walk
                .peak
                .map_or(true, |(best, at, _)| (score, at) > (best, coordinate));
            if cell.is_candidate(input.params) && better {
                walk.peak = Some((score, coordinate, walk.matched.len()));
            }
            walk.matched.push(coordinate);
        }
        match predecessor(i, j, cell.direction()) {
            Some(next) => (i, j) = next,
            None => break,
        }
    }
    walk
}

fn edge_cell(
    input: &TileInput,
    border: &Border,
    grid: &TileGrid,
    trails: &mut TrailArena,
    (i, j): (usize, usize),
) -> EdgeCell {
    let cell = grid[(i, j)];
    if cell.score() == 0 {
        return EdgeCell::default();
    }
    let walk = walk(input, border, grid, (i, j));
    if walk.matched.is_empty() {
        return EdgeCell {
            cell,
            trail: walk.exit,
        };
    }
    let id = trails.next_id();
    let mut peak = walk.peak.map(|(score, coordinate, offset)| Peak {
        score,
        coordinate,
        trail: id,
        offset,
    });
    if let Some(inherited) = walk.exit.and_then(|parent| trails.peak(parent)) {
        if peak.map_or(true, |peak| inherited.outranks(&peak)) {
            peak = Some(inherited);
        }
    }
    let trail = trails.push(Trail {
        matched: walk.matched,
        parent: walk.exit,
        peak,
    });
    EdgeCell {
        cell,
        trail: Some(trail),
    }
}

/// Cells whose chain reaches a far edge, and the peaks of the inbound chains they continue.
struct Deferred {
    cells: Vec<bool>,
    carried: FxHashSet<(TrailId, usize)>,
}

enum Choice {
    Cell { score: Score, local: (usize, usize), coordinate: Coordinate },
    Carried(Peak),
}

impl Choice {
    fn rank(&self) -> (Score, Coordinate) {
        match self {
            Choice::Cell { score, coordinate, .. } => (*score, *coordinate),
            Choice::Carried(peak) => (peak.score, peak.coordinate),
        }
    }

    fn outranks(&self, other: &Choice) -> bool {
        let ((score, coordinate), (other_score, other_coordinate)) = (self.rank(), other.rank());
        (score, other_coordinate) > (other_score, coordinate)
    }
}

pub struct TiledExecutor {
    sequences: [TokenSequence; 2],
    params: ScoreParams,
    backend: TileBackend,
    rows: usize,
    cols: usize,
    state: TiledCheckpoint,
}

impl TiledExecutor {
    pub fn new(
        sequences: [TokenSequence; 2],
        params: ScoreParams,
        tile_size: usize,
        backend: TileBackend,
    ) -> Result<Self, AlignmentError> {
        check_pair(&sequences)?;
        params.validate()?;
        if tile_size == 0 {
            return Err(AlignmentError::InvalidParameters("tile size must be positive".to_string()));
        }
        let state = TiledCheckpoint::fresh(tile_size, sequences[1].len());
        Ok(TiledExecutor::with_state(sequences, params, backend, state))
    }

    /// Continues a run from `checkpoint`. The sequences must carry the validity the run had when
    /// the checkpoint was taken.
    pub fn resume(
        sequences: [TokenSequence; 2],
        params: ScoreParams,
        backend: TileBackend,
        checkpoint: TiledCheckpoint,
    ) -> Result<Self, AlignmentError> {
        check_pair(&sequences)?;
        params.validate()?;
        let [m, n] = [sequences[0].len(), sequences[1].len()];
        let tile_size = checkpoint.tile_size;
        if tile_size == 0
            || checkpoint.north.len() != n + 1
            || checkpoint.next_north.len() != n + 1
            || checkpoint.west.len() != tile_size + 1
        {
            return Err(AlignmentError::InvalidParameters(format!(
                "checkpoint edges do not fit a {m}x{n} comparison with tile size {tile_size}"
            )));
        }
        let executor = TiledExecutor::with_state(sequences, params, backend, checkpoint);
        if executor.state.next_tile > executor.tile_count() {
            return Err(AlignmentError::InvalidParameters(format!(
                "checkpoint is at tile {} of {}",
                executor.state.next_tile,
                executor.tile_count()
            )));
        }
        let state = &executor.state;
        state.trails.validate(m, n)?;
        for edge in [&state.north, &state.next_north, &state.west] {
            state.trails.check_edges(edge)?;
        }
        Ok(executor)
    }

    fn with_state(
        sequences: [TokenSequence; 2],
        params: ScoreParams,
        backend: TileBackend,
        state: TiledCheckpoint,
    ) -> TiledExecutor {
        let tile_size = state.tile_size;
        let [rows, cols] = [sequences[0].len(), sequences[1].len()].map(|len| len.div_ceil(tile_size));
        TiledExecutor {
            sequences,
            params,
            backend,
            rows,
            cols,
            state,
        }
    }

    pub fn into_sequences(self) -> [TokenSequence; 2] {
        self.sequences
    }

    fn tile_count(&self) -> usize {
        self.rows * self.cols
    }

    fn span(&self, tile: usize) -> TileSpan {
        let tile_size = self.state.tile_size;
        let (row, col) = (tile / self.cols, tile % self.cols);
        let (x0, y0) = (row * tile_size + 1, col * tile_size + 1);
        TileSpan {
            row,
            col,
            x0,
            y0,
            height: tile_size.min(self.sequences[0].len() + 1 - x0),
            width: tile_size.min(self.sequences[1].len() + 1 - y0),
            east_far: col + 1 < self.cols,
            south_far: row + 1 < self.rows,
        }
    }

    fn input(&self, span: TileSpan) -> TileInput<'_> {
        TileInput {
            span,
            sequences: [&self.sequences[0], &self.sequences[1]],
            params: &self.params,
        }
    }

    fn border(&self, span: TileSpan) -> Border<'_> {
        Border {
            span,
            north: &self.state.north,
            west: &self.state.west,
        }
    }

    fn compute(&self, grid: &mut TileGrid, span: TileSpan) {
        let input = self.input(span);
        match self.backend {
            TileBackend::Sequential => grid.compute_sequential(&input),
            TileBackend::Wavefront => grid.compute_wavefront(&input),
        }
    }

    /// Marks every cell on a chain that reaches one of the tile's far edges.
    fn mark_deferred(&self, grid: &TileGrid, span: TileSpan) -> Deferred {
        let border = self.border(span);
        let mut deferred = Deferred {
            cells: vec![false; grid.len()],
            carried: FxHashSet::default(),
        };
        let east = (1..=span.height).filter(|_| span.east_far).map(|i| (i, span.width));
        let south = (1..=span.width).filter(|_| span.south_far).map(|j| (span.height, j));
        for (mut i, mut j) in east.chain(south) {
            loop {
                if i == 0 || j == 0 {
                    if let Some(peak) = border.edge(i, j).trail.and_then(|trail| self.state.trails.peak(trail)) {
                        deferred.carried.insert(peak.key());
                    }
                    break;
                }
                let cell = grid[(i, j)];
                let index = grid.flat_index(i, j);
                if cell.score() == 0 || deferred.cells[index] {
                    break;
                }
                deferred.cells[index] = true;
                match predecessor(i, j, cell.direction()) {
                    Some(next) => (i, j) = next,
                    None => break,
                }
            }
        }
        deferred
    }

    fn choose(
        &self,
        grid: &TileGrid,
        span: TileSpan,
        deferred: &Deferred,
        consumed: &FxHashSet<(TrailId, usize)>,
    ) -> Option<Choice> {
        let mut best: Option<Choice> = None;
        let mut offer = |choice: Choice| {
            if best.as_ref().map_or(true, |best| choice.outranks(best)) {
                best = Some(choice);
            }
        };
        for i in 1..=span.height {
            for j in 1..=span.width {
                let cell = grid[(i, j)];
                if cell.is_candidate(&self.params) && !deferred.cells[grid.flat_index(i, j)] {
                    offer(Choice::Cell {
                        score: cell.score(),
                        local: (i, j),
                        coordinate: span.global(i, j),
                    });
                }
            }
        }
        for edge in self.border(span).owned() {
            let Some(peak) = edge.trail.and_then(|trail| self.state.trails.peak(trail)) else {
                continue;
            };
            if !deferred.carried.contains(&peak.key()) && !consumed.contains(&peak.key()) {
                offer(Choice::Carried(peak));
            }
        }
        best
    }

    /// Invalidates every still-matching pair on `path` and returns how many there were.
    fn claim(&mut self, path: &[Coordinate]) -> usize {
        let mut claimed = 0;
        for &coordinate in path {
            if cell_matches([&self.sequences[0], &self.sequences[1]], coordinate) {
                let [a, b] = coordinate.token_indices();
                self.sequences[0].invalidate(a);
                self.sequences[1].invalidate(b);
                claimed += 1;
            }
        }
        claimed
    }

    fn solve_tile(&mut self, span: TileSpan) -> Result<(), AlignmentError> {
        let mut grid = TileGrid::new(span.height, span.width);
        for j in 0..=span.width {
            grid[(0, j)] = self.state.north[span.y0 - 1 + j].cell;
        }
        for i in 1..=span.height {
            grid[(i, 0)] = self.state.west[i].cell;
        }

        let mut consumed = FxHashSet::default();
        let mut deferred = Deferred {
            cells: vec![],
            carried: FxHashSet::default(),
        };
        let mut dirty = true;
        loop {
            if dirty {
                self.compute(&mut grid, span);
                deferred = self.mark_deferred(&grid, span);
                dirty = false;
            }
            match self.choose(&grid, span, &deferred, &consumed) {
                None => break,
                Some(Choice::Cell { score, local, coordinate }) => {
                    let mut path = walk(&self.input(span), &self.border(span), &grid, local);
                    self.state.trails.extend_path(path.exit, &mut path.matched);
                    let claimed = self.claim(&path.matched);
                    if claimed == 0 {
                        return Err(AlignmentError::invariant(coordinate, "candidate chain holds no matching cell"));
                    }
                    debug!(score, length = claimed, "claiming chain ending at {coordinate}");
                    dirty = true;
                }
                Some(Choice::Carried(peak)) => {
                    consumed.insert(peak.key());
                    let path = self.state.trails.peak_path(&peak);
                    let claimed = self.claim(&path);
                    if claimed > 0 {
                        debug!(
                            score = peak.score,
                            length = claimed,
                            "claiming carried chain ending at {}",
                            peak.coordinate
                        );
                        dirty = true;
                    }
                }
            }
        }

        self.finish_tile(&grid, span);
        Ok(())
    }

    /// Records the outbound edges of a solved tile and moves on to the next one.
    fn finish_tile(&mut self, grid: &TileGrid, span: TileSpan) {
        let TileSpan { height, width, .. } = span;
        let n = self.sequences[1].len();
        let tile_size = self.state.tile_size;
        let mut east = vec![];
        {
            let TiledExecutor {
                sequences,
                params,
                state,
                ..
            } = self;
            let input = TileInput {
                span,
                sequences: [&sequences[0], &sequences[1]],
                params,
            };
            let TiledCheckpoint {
                north,
                next_north,
                west,
                trails,
                ..
            } = state;
            let border = Border {
                span,
                north: north.as_slice(),
                west: west.as_slice(),
            };
            let mut edge = |local| edge_cell(&input, &border, grid, trails, local);
            let corner = (span.east_far && span.south_far).then(|| edge((height, width)));
            if span.east_far {
                east = vec![EdgeCell::default(); tile_size + 1];
                for i in 1..=height {
                    east[i] = match corner {
                        Some(corner) if i == height => corner,
                        _ => edge((i, width)),
                    };
                }
            }
            if span.south_far {
                for j in 1..=width {
                    next_north[span.y0 - 1 + j] = match corner {
                        Some(corner) if j == width => corner,
                        _ => edge((height, j)),
                    };
                }
            }
        }

        let state = &mut self.state;
        state.next_tile += 1;
        if span.east_far {
            state.west = east;
        } else {
            state.north = mem::replace(&mut state.next_north, vec![EdgeCell::default(); n + 1]);
            state.west = vec![EdgeCell::default(); tile_size + 1];
        }
        state
            .trails
            .compact([&mut state.north, &mut state.next_north, &mut state.west]);
        trace!(row = span.row, col = span.col, trails = state.trails.len(), "tile finished");
    }
}

impl Executor for TiledExecutor {
    fn step(&mut self, budget: Duration) -> Result<Progress, AlignmentError> {
        let started = Instant::now();
        while self.state.next_tile < self.tile_count() {
            let span = self.span(self.state.next_tile);
            self.solve_tile(span)?;
            if started.elapsed() >= budget {
                break;
            }
        }
        Ok(self.progress())
    }

    fn progress(&self) -> Progress {
        Progress::new(self.tile_count() as u64, self.state.next_tile as u64)
    }

    fn sequences(&self) -> [&TokenSequence; 2] {
        [&self.sequences[0], &self.sequences[1]]
    }

    fn checkpoint(&self) -> Option<TiledCheckpoint> {
        Some(self.state.clone())
    }
}
