pub mod benchmark;
pub mod candidates;
pub mod indices;
pub mod lines;
pub mod matrix;
pub mod scoring;
pub mod tiled;

#[cfg(test)]
mod test;

use std::{cmp::Ordering, time::Duration};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use self::{
    indices::Coordinate,
    lines::LineComparison,
    matrix::AlignmentMatrix,
    scoring::ScoreParams,
    tiled::{TileBackend, TiledCheckpoint, TiledExecutor},
};
use crate::{
    error::AlignmentError,
    token::{tokens_equal, ComparisonMode, TokenSequence},
};

/// Notional cell ceiling of the exhaustive matrix: 4 GiB cells.
pub const DEFAULT_MAX_CELLS: u64 = 4 * 1024 * 1024 * 1024;

pub const DEFAULT_TILE_SIZE: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    /// Exhaustive matrix while it fits in one tile, tiled beyond that.
    Auto,
    Exhaustive,
    Tiled,
    /// Claims every token whose content occurs on both sides, without the recurrence.
    LineCompare,
}

/// What actually ran for a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Empty,
    Identical,
    Exhaustive,
    Tiled,
    Oversized,
    LineCompare,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlignmentOptions {
    pub params: ScoreParams,
    pub max_cells: u64,
    pub tile_size: usize,
    pub backend: TileBackend,
}

impl Default for AlignmentOptions {
    fn default() -> AlignmentOptions {
        AlignmentOptions {
            params: ScoreParams::default(),
            max_cells: DEFAULT_MAX_CELLS,
            tile_size: DEFAULT_TILE_SIZE,
            backend: TileBackend::Wavefront,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total_work: u64,
    pub done_work: u64,
}

impl Progress {
    pub fn new(total_work: u64, done_work: u64) -> Progress {
        Progress { total_work, done_work }
    }

    pub fn is_complete(&self) -> bool {
        self.done_work == self.total_work
    }
}

/// A comparison that runs cooperatively, a bounded amount of work per call.
pub trait Executor: Send {
    /// Does at least one unit of work, then continues until `budget` is spent or nothing is left.
    fn step(&mut self, budget: Duration) -> Result<Progress, AlignmentError>;

    fn progress(&self) -> Progress;

    fn sequences(&self) -> [&TokenSequence; 2];

    /// State needed on top of the token validity to resume after a restart.
    fn checkpoint(&self) -> Option<TiledCheckpoint> {
        None
    }
}

/// Executor for comparisons decided without running the recurrence.
struct Settled {
    sequences: [TokenSequence; 2],
    progress: Progress,
}

impl Executor for Settled {
    fn step(&mut self, _budget: Duration) -> Result<Progress, AlignmentError> {
        Ok(self.progress)
    }

    fn progress(&self) -> Progress {
        self.progress
    }

    fn sequences(&self) -> [&TokenSequence; 2] {
        [&self.sequences[0], &self.sequences[1]]
    }
}

/// Runs a comparison on its sides in canonical order and presents them in the caller's order.
struct Swapped(Box<dyn Executor>);

impl Executor for Swapped {
    fn step(&mut self, budget: Duration) -> Result<Progress, AlignmentError> {
        self.0.step(budget)
    }

    fn progress(&self) -> Progress {
        self.0.progress()
    }

    fn sequences(&self) -> [&TokenSequence; 2] {
        let [a, b] = self.0.sequences();
        [b, a]
    }

    /// Still in canonical order, which `start` restores before resuming.
    fn checkpoint(&self) -> Option<TiledCheckpoint> {
        self.0.checkpoint()
    }
}

pub struct Alignment {
    pub executor: Box<dyn Executor>,
    pub strategy: Strategy,
}

pub(crate) fn cell_matches(sequences: [&TokenSequence; 2], coordinate: Coordinate) -> bool {
    let [a, b] = coordinate.token_indices();
    tokens_equal(&sequences[0][a], &sequences[1][b], ComparisonMode::ValidityEnsuring)
}

/// Preconditions of the entry points that need two non-empty sequences of one type.
pub(crate) fn check_pair(sequences: &[TokenSequence; 2]) -> Result<(), AlignmentError> {
    for (sequence, side) in sequences.iter().zip(["left", "right"]) {
        if sequence.is_empty() {
            return Err(AlignmentError::EmptySequence { side });
        }
    }
    check_types(sequences)
}

fn check_types(sequences: &[TokenSequence; 2]) -> Result<(), AlignmentError> {
    let [left, right] = [sequences[0].kind(), sequences[1].kind()];
    if left != right {
        return Err(AlignmentError::TokenTypeMismatch { left, right });
    }
    Ok(())
}

fn settled(sequences: [TokenSequence; 2], progress: Progress, strategy: Strategy) -> Alignment {
    Alignment {
        executor: Box::new(Settled { sequences, progress }),
        strategy,
    }
}

/// Picks and builds the executor for one pair. A `checkpoint` resumes an interrupted tiled run.
///
/// The recurrence breaks ties by scan order, so the sides are put in canonical order first and
/// swapping them claims the same tokens.
pub fn start(
    kind: AlgorithmKind,
    sequences: [TokenSequence; 2],
    options: &AlignmentOptions,
    checkpoint: Option<TiledCheckpoint>,
) -> Result<Alignment, AlignmentError> {
    options.params.validate()?;
    if sequences.iter().any(TokenSequence::is_empty) {
        return Ok(settled(sequences, Progress::default(), Strategy::Empty));
    }
    check_types(&sequences)?;

    if sequences[1].canonical_cmp(&sequences[0]) == Ordering::Less {
        let [a, b] = sequences;
        let alignment = start_canonical(kind, [b, a], options, checkpoint)?;
        return Ok(Alignment {
            executor: Box::new(Swapped(alignment.executor)),
            strategy: alignment.strategy,
        });
    }
    start_canonical(kind, sequences, options, checkpoint)
}

fn start_canonical(
    kind: AlgorithmKind,
    mut sequences: [TokenSequence; 2],
    options: &AlignmentOptions,
    checkpoint: Option<TiledCheckpoint>,
) -> Result<Alignment, AlignmentError> {
    if sequences[0].content_equals(&sequences[1]) {
        for sequence in sequences.iter_mut() {
            sequence.invalidate_all();
        }
        return Ok(settled(sequences, Progress::new(1, 1), Strategy::Identical));
    }

    if kind == AlgorithmKind::LineCompare {
        // Finishes in one slice, so any restored claims were made by another algorithm.
        for sequence in sequences.iter_mut() {
            sequence.reset_validity();
        }
        return Ok(Alignment {
            executor: Box::new(LineComparison::new(sequences)?),
            strategy: Strategy::LineCompare,
        });
    }

    if let Some(checkpoint) = checkpoint {
        if checkpoint.tile_size() != options.tile_size {
            debug!(
                configured = options.tile_size,
                "resuming with the checkpoint's tile size {}",
                checkpoint.tile_size()
            );
        }
        match TiledExecutor::resume(sequences.clone(), options.params, options.backend, checkpoint) {
            Ok(executor) => {
                debug!("resuming tiled comparison at {:?}", executor.progress());
                return Ok(Alignment {
                    executor: Box::new(executor),
                    strategy: Strategy::Tiled,
                });
            }
            Err(e) => {
                warn!("discarding checkpoint: {e}");
                for sequence in sequences.iter_mut() {
                    sequence.reset_validity();
                }
            }
        }
    }

    let cells = (sequences[0].len() as u64 + 1) * (sequences[1].len() as u64 + 1);
    let tile_cells = (options.tile_size as u64).saturating_add(1).saturating_pow(2);
    let exhaustive = match kind {
        AlgorithmKind::Exhaustive => true,
        AlgorithmKind::Auto => cells <= tile_cells.min(options.max_cells),
        _ => false,
    };

    if exhaustive {
        return match AlignmentMatrix::new(sequences.clone(), options.params, options.max_cells) {
            Ok(matrix) => Ok(Alignment {
                executor: Box::new(matrix),
                strategy: Strategy::Exhaustive,
            }),
            Err(e @ AlignmentError::OversizedComparison { .. }) => {
                warn!("{e}; reporting a degraded result");
                Ok(settled(sequences, Progress::new(1, 1), Strategy::Oversized))
            }
            Err(e) => Err(e),
        };
    }

    let executor = TiledExecutor::new(sequences, options.params, options.tile_size, options.backend)?;
    Ok(Alignment {
        executor: Box::new(executor),
        strategy: Strategy::Tiled,
    })
}
