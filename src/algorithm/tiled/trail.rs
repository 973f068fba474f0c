use std::mem;

use serde::{Deserialize, Serialize};

use super::packed::Packed;
use crate::{
    algorithm::{indices::Coordinate, scoring::Score},
    error::AlignmentError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrailId(usize);

/// The candidate a chain will be claimed from if nothing later outranks it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peak {
    pub score: Score,
    pub coordinate: Coordinate,
    /// Trail holding the peak cell, at `matched[offset]`.
    pub trail: TrailId,
    pub offset: usize,
}

impl Peak {
    pub fn key(&self) -> (TrailId, usize) {
        (self.trail, self.offset)
    }

    /// Higher score first, then the earlier cell in scan order.
    pub fn outranks(&self, other: &Peak) -> bool {
        (self.score, other.coordinate) > (other.score, self.coordinate)
    }
}

/// Matching cells of one chain segment inside one tile, latest first. The segment continues in
/// `parent`, which lies in an earlier tile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trail {
    pub matched: Vec<Coordinate>,
    pub parent: Option<TrailId>,
    pub peak: Option<Peak>,
}

/// A cell on a tile edge together with the chain that reaches it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeCell {
    pub cell: Packed,
    pub trail: Option<TrailId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailArena {
    trails: Vec<Trail>,
}

impl TrailArena {
    pub fn len(&self) -> usize {
        self.trails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    /// Id the next `push` will return.
    pub fn next_id(&self) -> TrailId {
        TrailId(self.trails.len())
    }

    pub fn push(&mut self, trail: Trail) -> TrailId {
        let id = self.next_id();
        self.trails.push(trail);
        id
    }

    pub fn get(&self, id: TrailId) -> &Trail {
        &self.trails[id.0]
    }

    pub fn peak(&self, id: TrailId) -> Option<Peak> {
        self.get(id).peak
    }

    /// Appends the matched cells of `id` and all its ancestors.
    pub fn extend_path(&self, mut id: Option<TrailId>, path: &mut Vec<Coordinate>) {
        while let Some(current) = id {
            let trail = self.get(current);
            path.extend_from_slice(&trail.matched);
            id = trail.parent;
        }
    }

    /// The chain that ends at `peak`, latest cell first.
    pub fn peak_path(&self, peak: &Peak) -> Vec<Coordinate> {
        let origin = self.get(peak.trail);
        let mut path = origin.matched[peak.offset..].to_vec();
        self.extend_path(origin.parent, &mut path);
        path
    }

    /// Drops every trail no edge cell in `edges` can reach, renumbering the rest in order.
    pub fn compact(&mut self, edges: [&mut [EdgeCell]; 3]) {
        let mut live = vec![false; self.trails.len()];
        let mut stack: Vec<TrailId> = edges.iter().flat_map(|edge| edge.iter()).filter_map(|edge| edge.trail).collect();
        while let Some(id) = stack.pop() {
            if mem::replace(&mut live[id.0], true) {
                continue;
            }
            let trail = &self.trails[id.0];
            stack.extend(trail.parent);
            stack.extend(trail.peak.map(|peak| peak.trail));
        }

        let mut remap = vec![usize::MAX; self.trails.len()];
        let mut kept = Vec::with_capacity(live.iter().filter(|&&live| live).count());
        for (index, trail) in mem::take(&mut self.trails).into_iter().enumerate() {
            if live[index] {
                remap[index] = kept.len();
                kept.push(trail);
            }
        }
        let relink = |id: TrailId| TrailId(remap[id.0]);
        for trail in kept.iter_mut() {
            trail.parent = trail.parent.map(relink);
            if let Some(peak) = trail.peak.as_mut() {
                peak.trail = relink(peak.trail);
            }
        }
        for edge in edges {
            for cell in edge.iter_mut() {
                cell.trail = cell.trail.map(relink);
            }
        }
        self.trails = kept;
    }

    /// Checks that every link points backwards and every cell lies inside an `m x n` matrix.
    pub fn validate(&self, m: usize, n: usize) -> Result<(), AlignmentError> {
        let invalid = |message: String| Err(AlignmentError::InvalidParameters(format!("checkpoint trail {message}")));
        for (index, trail) in self.trails.iter().enumerate() {
            if let Some(&coordinate) = trail
                .matched
                .iter()
                .find(|c| c.x == 0 || c.y == 0 || c.x > m || c.y > n)
            {
                return invalid(format!("{index} holds {coordinate}, outside {m}x{n}"));
            }
            if trail.parent.map_or(false, |parent| parent.0 >= index) {
                return invalid(format!("{index} has a forward parent link"));
            }
            if let Some(peak) = trail.peak {
                if peak.trail.0 > index || peak.offset >= self.trails[peak.trail.0].matched.len() {
                    return invalid(format!("{index} carries a dangling peak"));
                }
            }
        }
        Ok(())
    }

    pub fn check_edges(&self, edge: &[EdgeCell]) -> Result<(), AlignmentError> {
        match edge.iter().filter_map(|edge| edge.trail).find(|id| id.0 >= self.trails.len()) {
            Some(id) => Err(AlignmentError::InvalidParameters(format!(
                "checkpoint edge refers to missing trail {}",
                id.0
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn coordinates(cells: &[(usize, usize)]) -> Vec<Coordinate> {
        cells.iter().map(|&(x, y)| Coordinate::new(x, y)).collect()
    }

    fn edge(trail: Option<TrailId>) -> EdgeCell {
        EdgeCell {
            cell: Packed::ZERO,
            trail,
        }
    }

    #[test]
    fn peak_path_follows_parents() {
        let mut arena = TrailArena::default();
        let root = arena.push(Trail {
            matched: coordinates(&[(2, 2), (1, 1)]),
            parent: None,
            peak: None,
        });
        let peak = Peak {
            score: 4,
            coordinate: Coordinate::new(4, 4),
            trail: arena.next_id(),
            offset: 1,
        };
        let child = arena.push(Trail {
            matched: coordinates(&[(5, 5), (4, 4), (3, 3)]),
            parent: Some(root),
            peak: Some(peak),
        });
        assert_eq!(arena.peak(child), Some(peak));
        assert_eq!(arena.peak_path(&peak), coordinates(&[(4, 4), (3, 3), (2, 2), (1, 1)]));
        assert!(arena.validate(5, 5).is_ok());
        assert!(arena.validate(4, 5).is_err());
    }

    #[test]
    fn compaction_keeps_reachable_trails() {
        let mut arena = TrailArena::default();
        arena.push(Trail {
            matched: coordinates(&[(1, 1)]),
            parent: None,
            peak: None,
        });
        let root = arena.push(Trail {
            matched: coordinates(&[(1, 2)]),
            parent: None,
            peak: None,
        });
        let child = arena.push(Trail {
            matched: coordinates(&[(2, 3)]),
            parent: Some(root),
            peak: None,
        });
        let mut north = vec![edge(Some(child)), edge(None)];
        let mut west = vec![edge(None)];
        arena.compact([north.as_mut_slice(), &mut [], west.as_mut_slice()]);
        assert_eq!(arena.len(), 2);
        let id = north[0].trail.unwrap();
        let mut path = vec![];
        arena.extend_path(Some(id), &mut path);
        assert_eq!(path, coordinates(&[(2, 3), (1, 2)]));
        assert!(arena.validate(2, 3).is_ok());
    }

    #[test]
    fn outranking_prefers_score_then_scan_order() {
        let peak = |score, x, y| Peak {
            score,
            coordinate: Coordinate::new(x, y),
            trail: TrailId(0),
            offset: 0,
        };
        assert!(peak(5, 9, 9).outranks(&peak(4, 1, 1)));
        assert!(peak(5, 1, 9).outranks(&peak(5, 2, 1)));
        assert!(!peak(5, 2, 1).outranks(&peak(5, 1, 9)));
        assert!(!peak(5, 2, 1).outranks(&peak(5, 2, 1)));
    }
}
