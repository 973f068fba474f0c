use std::collections::BTreeMap;

use super::{indices::Coordinate, scoring::Score};

/// Candidate cells of one scan, grouped by score. Coordinates keep scan order within a score.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CandidateMap {
    by_score: BTreeMap<Score, Vec<Coordinate>>,
}

impl CandidateMap {
    pub fn new() -> CandidateMap {
        CandidateMap::default()
    }

    pub fn insert(&mut self, score: Score, coordinate: Coordinate) {
        self.by_score.entry(score).or_default().push(coordinate);
    }

    pub fn is_empty(&self) -> bool {
        self.by_score.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_score.values().map(Vec::len).sum()
    }

    /// The highest score and the first coordinate scanned at that score.
    pub fn best(&self) -> Option<(Score, Coordinate)> {
        let (&score, coordinates) = self.by_score.last_key_value()?;
        coordinates.first().map(|&coordinate| (score, coordinate))
    }

    #[cfg(test)]
    pub fn at(&self, score: Score) -> &[Coordinate] {
        self.by_score.get(&score).map(Vec::as_slice).unwrap_or(&[])
    }
}
