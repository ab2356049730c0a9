use crate::TrackId;
use thiserror::Error;

/// Errors returned across the engine entry points.
///
/// The first group are rejections of a single measurement batch: the engine
/// stays healthy and the next batch is processed normally. The second group
/// are programming faults that abort the current cycle.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackerError {
    #[error("no sensor-to-world transform accompanies the batch at t={timestamp}")]
    TransformUnavailable { timestamp: f64 },

    #[error("sensor-to-world transform for the batch at t={timestamp} is not finite")]
    NonFiniteTransform { timestamp: f64 },

    #[error("timestamp {0} is not finite")]
    InvalidTimestamp(f64),

    #[error("batch at t={timestamp} is older than the last measurement at t={last}")]
    OutOfOrder { timestamp: f64, last: f64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cost matrix is {costs:?} but the gate mask is {mask:?}")]
    DimensionMismatch {
        costs: (usize, usize),
        mask: (usize, usize),
    },

    #[error("track identifier {0} is already in use")]
    DuplicateTrackId(TrackId),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl TrackerError {
    /// Returns true if the error rejects one batch rather than signalling a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TrackerError::TransformUnavailable { .. }
                | TrackerError::NonFiniteTransform { .. }
                | TrackerError::InvalidTimestamp(_)
                | TrackerError::OutOfOrder { .. }
        )
    }
}

/// Why a detection cannot be fused into a track.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DetectionDefect {
    #[error("pose is not finite")]
    NonFinitePose,
    #[error("shape has a non-positive or non-finite extent")]
    DegenerateExtent,
    #[error("confidence is not finite")]
    NonFiniteConfidence,
}
