use crate::{
    existence::ExistenceEstimator, kalman_filter::ConstantVelocityFilter,
    motion_model::{MotionModel, ObjectState},
    ClassParams, Detection, DetectionDefect, Pose, Shape, Velocity,
};
use nalgebra::{Matrix2, Vector2};

const POSITION_STD: f64 = 1.0;
const VELOCITY_STD: f64 = 5.0;
const ACCELERATION_STD: f64 = 5.0;
const MEASUREMENT_STD: f64 = 0.8;

/// Estimator for objects of unknown class.
///
/// The footprint of an unknown object changes shape from one detection to the
/// next, so pose and shape are replaced by the latest detection and only the
/// centre is filtered.
#[derive(Debug, Clone)]
pub struct UnknownModel {
    filter: ConstantVelocityFilter,
    yaw: f64,
    z: f64,
    shape: Shape,
    existence: ExistenceEstimator,
}

impl UnknownModel {
    pub fn new(detection: &Detection, params: &ClassParams) -> UnknownModel {
        let pose = detection.pose();
        UnknownModel {
            filter: ConstantVelocityFilter::initiate(
                Vector2::new(pose.x(), pose.y()),
                POSITION_STD,
                VELOCITY_STD,
                ACCELERATION_STD,
                MEASUREMENT_STD,
            ),
            yaw: pose.yaw(),
            z: pose.z(),
            shape: *detection.shape(),
            existence: ExistenceEstimator::new(
                detection.confidence(),
                params.existence_time_constant,
                params.existence_gain,
            ),
        }
    }
}

impl MotionModel for UnknownModel {
    fn name(&self) -> &'static str {
        "unknown"
    }

    fn clone_box(&self) -> Box<dyn MotionModel> {
        Box::new(self.clone())
    }

    fn predict(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.filter.predict(dt);
        self.existence.predict(dt);
    }

    fn correct(&mut self, detection: &Detection) -> Result<(), DetectionDefect> {
        detection.validate()?;
        let pose = detection.pose();

        if !self.filter.update(&Vector2::new(pose.x(), pose.y())) {
            return Err(DetectionDefect::NonFinitePose);
        }
        self.yaw = pose.yaw();
        self.z = pose.z();
        self.shape = *detection.shape();
        self.existence.correct(detection.confidence());

        Ok(())
    }

    fn state(&self) -> ObjectState {
        let position = self.filter.position();
        let velocity = self.filter.velocity();
        ObjectState {
            pose: Pose::new(position.x, position.y, self.z, self.yaw),
            velocity: Velocity::new(velocity.x, velocity.y),
            shape: self.shape,
            position_covariance: self.filter.position_covariance(),
        }
    }

    fn existence_probability(&self) -> f64 {
        self.existence.probability()
    }

    fn innovation_covariance(&self) -> Matrix2<f64> {
        self.filter.project().1
    }

    fn gating_distance(&self, detection: &Detection) -> f64 {
        let pose = detection.pose();
        self.filter
            .gating_distance(&Vector2::new(pose.x(), pose.y()))
    }
}
