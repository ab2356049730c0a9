use crate::{
    existence::ExistenceEstimator, kalman_filter::ConstantVelocityFilter,
    motion_model::{MotionModel, ObjectState},
    ClassParams, Detection, DetectionDefect, Pose, Shape, Velocity,
};
use nalgebra::{Matrix2, Vector2};

const POSITION_STD: f64 = 0.5;
const VELOCITY_STD: f64 = 2.0;
const ACCELERATION_STD: f64 = 1.5;
const MEASUREMENT_STD: f64 = 0.3;
const SHAPE_GAIN: f64 = 0.3;
/// Below this speed (m/s) the reported heading is kept instead of the direction of travel.
const MIN_HEADING_SPEED: f64 = 0.5;

/// Pedestrian estimator: constant-velocity centre filter, heading taken from the direction of travel.
#[derive(Debug, Clone)]
pub struct PedestrianModel {
    filter: ConstantVelocityFilter,
    yaw: f64,
    z: f64,
    shape: Shape,
    existence: ExistenceEstimator,
}

impl PedestrianModel {
    pub fn new(detection: &Detection, params: &ClassParams) -> PedestrianModel {
        let pose = detection.pose();
        PedestrianModel {
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

impl MotionModel for PedestrianModel {
    fn name(&self) -> &'static str {
        "pedestrian"
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
        self.z += SHAPE_GAIN * (pose.z() - self.z);
        self.shape = self.shape.blend(detection.shape(), SHAPE_GAIN);
        self.existence.correct(detection.confidence());

        Ok(())
    }

    fn state(&self) -> ObjectState {
        let position = self.filter.position();
        let velocity = Velocity::new(self.filter.velocity().x, self.filter.velocity().y);
        let yaw = if velocity.speed() > MIN_HEADING_SPEED {
            velocity.heading()
        } else {
            self.yaw
        };
        ObjectState {
            pose: Pose::new(position.x, position.y, self.z, yaw),
            velocity,
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
