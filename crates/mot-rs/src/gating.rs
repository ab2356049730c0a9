use crate::{geometry::wrap_angle, ClassParams, ClassTable, Detection, Track};
use ndarray::Array2;
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::warn;

lazy_static! {
    /**
    Table for the 0.99 quantile of the chi-square distribution with N degrees of freedom (contains values for N=1, ..., 6).
    Taken from MATLAB/Octave's chi2inv function and used as Mahalanobis gating threshold.
    */
    pub static ref CHI2INV99: HashMap<usize, f64> = HashMap::from([
        (1, 6.6349),
        (2, 9.2103),
        (3, 11.345),
        (4, 13.277),
        (5, 15.086),
        (6, 16.812),
    ]);
}

/// Association costs of every track/detection pair of one cycle.
///
/// Entry (i, j) of `costs` is only meaningful where `feasible[[i, j]]` is true.
/// A gated pair is never a candidate, whatever its cost.
#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrix {
    pub costs: Array2<f64>,
    pub feasible: Array2<bool>,
}

impl CostMatrix {
    /// Returns a cost matrix with every pair gated.
    pub fn gated(tracks: usize, detections: usize) -> CostMatrix {
        CostMatrix {
            costs: Array2::from_elem((tracks, detections), f64::INFINITY),
            feasible: Array2::from_elem((tracks, detections), false),
        }
    }

    /// Returns a cost matrix where every finite cost is feasible.
    pub fn from_costs(costs: Array2<f64>) -> CostMatrix {
        let feasible = costs.mapv(|v| v.is_finite());
        CostMatrix { costs, feasible }
    }

    /// Number of tracks (rows) and detections (columns).
    pub fn dim(&self) -> (usize, usize) {
        self.costs.dim()
    }

    pub fn is_feasible(&self, track_idx: usize, detection_idx: usize) -> bool {
        self.feasible[[track_idx, detection_idx]]
    }

    pub fn cost(&self, track_idx: usize, detection_idx: usize) -> f64 {
        self.costs[[track_idx, detection_idx]]
    }

    /// Number of feasible pairs.
    pub fn feasible_count(&self) -> usize {
        self.feasible.iter().filter(|v| **v).count()
    }
}

/// Association cost of a single track/detection pair.
///
/// Returns `None` when the pair is gated out, otherwise a normalised cost in
/// `[0, 1]` where lower is a better match.
pub trait CostFunction: Send + Sync {
    fn cost(&self, track: &Track, detection: &Detection, params: &ClassParams) -> Option<f64>;
}

/// Default gate: planar distance, footprint area and heading checks followed
/// by a chi-square test on the squared Mahalanobis distance of the centre.
///
/// The cost is the squared Mahalanobis distance divided by the gate threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct MahalanobisCost;

impl CostFunction for MahalanobisCost {
    fn cost(&self, track: &Track, detection: &Detection, params: &ClassParams) -> Option<f64> {
        let state = track.state();

        if state.pose.distance_2d(detection.pose()) > params.max_distance {
            return None;
        }

        let area = detection.shape().area();
        if area < params.min_area || area > params.max_area {
            return None;
        }

        if let Some(max_yaw_diff) = params.max_yaw_diff {
            if yaw_difference(state.pose.yaw(), detection.pose().yaw()) > max_yaw_diff {
                return None;
            }
        }

        let squared_distance = track.model().gating_distance(detection);
        if !squared_distance.is_finite() || squared_distance > params.gate_chi2 {
            return None;
        }

        Some((squared_distance / params.gate_chi2).clamp(0.0, 1.0))
    }
}

/// Difference between two headings, ignoring direction, in `[0, PI/2]`.
pub fn yaw_difference(a: f64, b: f64) -> f64 {
    let diff = wrap_angle(a - b).abs();
    diff.min(PI - diff)
}

/// Builds the cost matrix of one cycle.
pub struct CostEvaluator {
    cost_function: Box<dyn CostFunction>,
}

impl Default for CostEvaluator {
    fn default() -> Self {
        CostEvaluator::new(Box::new(MahalanobisCost))
    }
}

impl CostEvaluator {
    /// Returns a new CostEvaluator
    ///
    /// # Parameters
    ///
    /// * `cost_function`: Gate and cost applied to every class-compatible pair.
    pub fn new(cost_function: Box<dyn CostFunction>) -> CostEvaluator {
        CostEvaluator { cost_function }
    }

    /// Evaluates every track/detection pair.
    ///
    /// A cost outside `[0, 1]` (NaN included) breaks the contract of
    /// [`CostFunction`] and the pair is gated.
    ///
    /// # Parameters
    ///
    /// * `tracks`: Tracks predicted to the batch timestamp. Rows of the result.
    /// * `detections`: Detections in the world frame. Columns of the result.
    /// * `classes`: Parameters per class; a pair is gated with the parameters of the track class.
    pub fn evaluate(
        &self,
        tracks: &[Track],
        detections: &[Detection],
        classes: &ClassTable,
    ) -> CostMatrix {
        let mut matrix = CostMatrix::gated(tracks.len(), detections.len());
        let mut out_of_range = 0usize;

        tracks.iter().enumerate().for_each(|(row, track)| {
            let class = track.class();
            let params = classes.get(class);

            detections
                .iter()
                .enumerate()
                .filter(|(_, detection)| class.is_compatible(&detection.class()))
                .for_each(|(col, detection)| {
                    match self.cost_function.cost(track, detection, &params) {
                        Some(cost) if (0.0..=1.0).contains(&cost) => {
                            matrix.costs[[row, col]] = cost;
                            matrix.feasible[[row, col]] = true;
                        }
                        // NaN, infinite or outside the normalised range
                        Some(_) => out_of_range += 1,
                        None => {}
                    }
                });
        });

        if out_of_range > 0 {
            warn!(out_of_range, "costs outside [0, 1] gated out");
        }

        matrix
    }
}
