use crate::{gating::CostMatrix, TrackerError};
use fixedbitset::FixedBitSet;
use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;
use std::cmp::Ordering;
use tracing::warn;

/// Scale from the `[0, 1]` cost range to the integer weights Kuhn-Munkres requires (`f64` does not implement `Ord`).
const COST_SCALE: f64 = 1_000_000.0;

/// Cost of leaving one track or one detection unmatched.
const UNMATCHED_COST: i64 = COST_SCALE as i64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub track_idx: usize,
    pub detection_idx: usize,
    pub cost: f64,
}

impl Match {
    /// Return a new Match
    ///
    /// # Parameters
    ///
    /// * `track_idx`: The match track index.
    /// * `detection_idx`: The match detection index.
    /// * `cost`: Association cost of the pair.
    pub fn new(track_idx: usize, detection_idx: usize, cost: f64) -> Match {
        Match {
            track_idx,
            detection_idx,
            cost,
        }
    }
}

/// Outcome of one association round. Every index list is sorted ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationResult {
    pub matches: Vec<Match>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
    /// True if part of the problem was matched greedily because it exceeded the size cap.
    pub degraded: bool,
}

/// Disjoint sets over the tracks and detections of one cost matrix, with path halving and union by rank.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> DisjointSet {
        DisjointSet {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, x: usize, y: usize) {
        let (rx, ry) = (self.find(x), self.find(y));
        if rx == ry {
            return;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            Ordering::Less => self.parent[rx] = ry,
            Ordering::Greater => self.parent[ry] = rx,
            Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
    }
}

/// A connected group of tracks and detections. No feasible pair crosses two components.
#[derive(Debug, Default)]
struct Component {
    rows: Vec<usize>,
    cols: Vec<usize>,
}

/// Split the feasibility graph into connected components, ordered by their lowest track index.
///
/// Tracks and detections without any feasible pair belong to no component.
fn partition(matrix: &CostMatrix) -> Vec<Component> {
    let (n_tracks, n_detections) = matrix.dim();
    let mut sets = DisjointSet::new(n_tracks + n_detections);
    let mut connected = FixedBitSet::with_capacity(n_tracks + n_detections);

    for ((row, col), feasible) in matrix.feasible.indexed_iter() {
        if *feasible {
            sets.union(row, n_tracks + col);
            connected.insert(row);
            connected.insert(n_tracks + col);
        }
    }

    let mut component_of_root: Vec<Option<usize>> = vec![None; n_tracks + n_detections];
    let mut components: Vec<Component> = Vec::new();

    for row in (0..n_tracks).filter(|row| connected.contains(*row)) {
        let root = sets.find(row);
        let idx = *component_of_root[root].get_or_insert_with(|| {
            components.push(Component::default());
            components.len() - 1
        });
        components[idx].rows.push(row);
    }

    for col in (0..n_detections).filter(|col| connected.contains(n_tracks + *col)) {
        let root = sets.find(n_tracks + col);
        // every connected detection shares a component with at least one track
        if let Some(idx) = component_of_root[root] {
            components[idx].cols.push(col);
        }
    }

    components
}

/// Solve one sub-problem optimally.
///
/// The square matrix is augmented with one "unmatched" column per track and
/// one "unmatched" row per detection, so that a pair is only assigned when
/// doing so lowers the total cost, and infeasible pairs can never be forced.
fn solve_optimal(
    matrix: &CostMatrix,
    rows: &[usize],
    cols: &[usize],
) -> Result<Vec<Match>, TrackerError> {
    let (n_rows, n_cols) = (rows.len(), cols.len());
    let n = n_rows + n_cols;
    if n_rows == 0 || n_cols == 0 {
        return Ok(vec![]);
    }

    // any assignment using a prohibited entry costs more than leaving everything unmatched
    let prohibited = (n as i64 + 1) * UNMATCHED_COST;

    let mut weights = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let weight = match (i < n_rows, j < n_cols) {
                (true, true) if matrix.is_feasible(rows[i], cols[j]) => {
                    (matrix.cost(rows[i], cols[j]) * COST_SCALE).round() as i64
                }
                (true, true) => prohibited,
                (true, false) | (false, true) => UNMATCHED_COST,
                (false, false) => 0,
            };
            weights.push(weight);
        }
    }

    let weights = Matrix::from_vec(n, n, weights)
        .map_err(|e| TrackerError::Invariant(format!("assignment matrix: {e}")))?;

    // `kuhn_munkres_min` returns the assigned column of every row
    let (_, assignment) = kuhn_munkres_min(&weights);

    Ok(assignment
        .into_iter()
        .enumerate()
        .take(n_rows)
        .filter(|(_, j)| *j < n_cols)
        .filter(|(i, j)| matrix.is_feasible(rows[*i], cols[*j]))
        .map(|(i, j)| Match::new(rows[i], cols[j], matrix.cost(rows[i], cols[j])))
        .collect())
}

/// Match the remaining feasible pairs of a component in order of increasing cost.
fn solve_greedy(
    matrix: &CostMatrix,
    rows: &[usize],
    cols: &[usize],
    used_tracks: &mut FixedBitSet,
    used_detections: &mut FixedBitSet,
) -> Vec<Match> {
    let mut candidates = rows
        .iter()
        .filter(|row| !used_tracks.contains(**row))
        .flat_map(|row| {
            cols.iter()
                .filter(|col| !used_detections.contains(**col))
                .filter(|col| matrix.is_feasible(*row, **col))
                .map(|col| Match::new(*row, *col, matrix.cost(*row, *col)))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    candidates.sort_by(|a, b| {
        a.cost
            .total_cmp(&b.cost)
            .then(a.track_idx.cmp(&b.track_idx))
            .then(a.detection_idx.cmp(&b.detection_idx))
    });

    candidates
        .into_iter()
        .filter(|m| {
            if used_tracks.contains(m.track_idx) || used_detections.contains(m.detection_idx) {
                false
            } else {
                used_tracks.insert(m.track_idx);
                used_detections.insert(m.detection_idx);
                true
            }
        })
        .collect()
}

/// Solve linear assignment problem.
///
/// # Parameters
///
/// * `matrix`: The NxM cost matrix and gate mask, where element (i, j) is the association cost between the i-th track and the j-th detection.
/// * `max_problem_size`: Largest number of tracks or detections of one connected component solved optimally. The overflow is matched greedily.
///
/// # Returns
///
/// The matched pairs (never a gated one), the unmatched track indices and the unmatched detection indices.
/// A feasible cost outside `[0, 1]` is an invariant violation.
pub fn min_cost_matching(
    matrix: &CostMatrix,
    max_problem_size: usize,
) -> Result<AssociationResult, TrackerError> {
    if matrix.costs.dim() != matrix.feasible.dim() {
        return Err(TrackerError::DimensionMismatch {
            costs: matrix.costs.dim(),
            mask: matrix.feasible.dim(),
        });
    }

    if let Some((cost, _)) = matrix
        .costs
        .iter()
        .zip(matrix.feasible.iter())
        .find(|(cost, feasible)| **feasible && !(0.0..=1.0).contains(*cost))
    {
        return Err(TrackerError::Invariant(format!(
            "feasible association cost {cost} is outside [0, 1]"
        )));
    }

    let (n_tracks, n_detections) = matrix.dim();
    let mut used_tracks = FixedBitSet::with_capacity(n_tracks);
    let mut used_detections = FixedBitSet::with_capacity(n_detections);
    let mut matches: Vec<Match> = Vec::with_capacity(n_tracks.min(n_detections));
    let mut degraded = false;

    for component in partition(matrix) {
        let oversized =
            component.rows.len() > max_problem_size || component.cols.len() > max_problem_size;

        let rows = &component.rows[..component.rows.len().min(max_problem_size)];
        let cols = &component.cols[..component.cols.len().min(max_problem_size)];

        for m in solve_optimal(matrix, rows, cols)? {
            used_tracks.insert(m.track_idx);
            used_detections.insert(m.detection_idx);
            matches.push(m);
        }

        if oversized {
            warn!(
                tracks = component.rows.len(),
                detections = component.cols.len(),
                max_problem_size,
                "association component exceeds the size cap, matching the overflow greedily"
            );
            degraded = true;
            matches.extend(solve_greedy(
                matrix,
                &component.rows,
                &component.cols,
                &mut used_tracks,
                &mut used_detections,
            ));
        }
    }

    matches.sort_by_key(|m| m.track_idx);

    Ok(AssociationResult {
        matches,
        unmatched_tracks: (0..n_tracks)
            .filter(|i| !used_tracks.contains(*i))
            .collect(),
        unmatched_detections: (0..n_detections)
            .filter(|j| !used_detections.contains(*j))
            .collect(),
        degraded,
    })
}
