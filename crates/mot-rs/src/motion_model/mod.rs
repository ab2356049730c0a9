//! Per-class estimators behind one capability set.
//!
//! Tracks own their estimator as a `Box<dyn MotionModel>` chosen by
//! [`create`] from the class of the detection that started the track, so the
//! lifecycle code never depends on a concrete filter.

use crate::{ClassParams, Detection, DetectionDefect, ObjectClass, Pose, Shape, Velocity};
use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};
use std::fmt;

mod pedestrian;
mod unknown;
mod vehicle;

pub use pedestrian::PedestrianModel;
pub use unknown::UnknownModel;
pub use vehicle::{VehicleModel, VehicleProfile};

/// Best estimate of the kinematic state of a tracked object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectState {
    pub pose: Pose,
    pub velocity: Velocity,
    pub shape: Shape,
    /// Covariance of the planar centre position (m²).
    pub position_covariance: Matrix2<f64>,
}

impl ObjectState {
    pub fn is_finite(&self) -> bool {
        self.pose.is_finite()
            && self.velocity.vx.is_finite()
            && self.velocity.vy.is_finite()
            && self.shape.length().is_finite()
            && self.shape.width().is_finite()
            && self.shape.height().is_finite()
            && self.position_covariance.iter().all(|v| v.is_finite())
    }
}

/// Estimator of one object's state.
///
/// Implementations must keep their state finite and must grow the position
/// uncertainty with `dt` when no correction is applied.
pub trait MotionModel: Send + fmt::Debug {
    /// Short name of the model, for logs.
    fn name(&self) -> &'static str;

    /// Returns an independent copy, used to predict without touching the track.
    fn clone_box(&self) -> Box<dyn MotionModel>;

    /// Advance the state by `dt` seconds. Non-positive or non-finite `dt` is a no-op.
    fn predict(&mut self, dt: f64);

    /// Fuse an associated detection. Degenerate geometry leaves the state untouched.
    fn correct(&mut self, detection: &Detection) -> Result<(), DetectionDefect>;

    fn state(&self) -> ObjectState;

    fn existence_probability(&self) -> f64;

    /// Covariance of the predicted position measurement (state plus measurement noise).
    fn innovation_covariance(&self) -> Matrix2<f64>;

    /// Squared Mahalanobis distance between the predicted position and a detection.
    fn gating_distance(&self, detection: &Detection) -> f64;
}

/// Estimator used for the tracks of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Vehicle,
    TwoWheeler,
    Pedestrian,
    Unknown,
}

impl ModelKind {
    /// Default estimator of a class family.
    pub fn for_class(class: ObjectClass) -> ModelKind {
        match class {
            class if class.is_vehicle() => ModelKind::Vehicle,
            class if class.is_two_wheeler() => ModelKind::TwoWheeler,
            ObjectClass::Pedestrian => ModelKind::Pedestrian,
            _ => ModelKind::Unknown,
        }
    }
}

/// Returns the estimator for a new track started by `detection`.
///
/// The estimator is the `model` of `params`, the parameters of the detection class.
pub fn create(
    detection: &Detection,
    params: &ClassParams,
) -> Result<Box<dyn MotionModel>, DetectionDefect> {
    detection.validate()?;

    let model: Box<dyn MotionModel> = match params.model {
        ModelKind::Vehicle => Box::new(VehicleModel::new(
            detection,
            VehicleProfile::four_wheeler(),
            params,
        )),
        ModelKind::TwoWheeler => Box::new(VehicleModel::new(
            detection,
            VehicleProfile::two_wheeler(),
            params,
        )),
        ModelKind::Pedestrian => Box::new(PedestrianModel::new(detection, params)),
        ModelKind::Unknown => Box::new(UnknownModel::new(detection, params)),
    };
    Ok(model)
}
