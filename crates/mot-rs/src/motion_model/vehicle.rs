use crate::{
    existence::ExistenceEstimator, geometry::wrap_angle, kalman_filter::ConstantVelocityFilter,
    motion_model::{MotionModel, ObjectState},
    ClassParams, Detection, DetectionDefect, Pose, Shape, Velocity,
};
use nalgebra::{Matrix2, Vector2};
use std::f64::consts::{FRAC_PI_2, PI};

/// Noise and smoothing parameters of a [`VehicleModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleProfile {
    pub name: &'static str,
    pub position_std: f64,
    pub velocity_std: f64,
    pub acceleration_std: f64,
    pub measurement_std: f64,
    pub yaw_std: f64,
    pub yaw_rate_std: f64,
    pub yaw_measurement_std: f64,
    /// Weight of a new detection in the smoothed shape.
    pub shape_gain: f64,
}

impl VehicleProfile {
    pub fn four_wheeler() -> VehicleProfile {
        VehicleProfile {
            name: "vehicle",
            position_std: 1.0,
            velocity_std: 10.0,
            acceleration_std: 3.0,
            measurement_std: 0.5,
            yaw_std: 0.3,
            yaw_rate_std: 0.5,
            yaw_measurement_std: 0.2,
            shape_gain: 0.3,
        }
    }

    pub fn two_wheeler() -> VehicleProfile {
        VehicleProfile {
            name: "two_wheeler",
            position_std: 0.7,
            velocity_std: 6.0,
            acceleration_std: 2.5,
            measurement_std: 0.4,
            yaw_std: 0.5,
            yaw_rate_std: 0.8,
            yaw_measurement_std: 0.3,
            shape_gain: 0.3,
        }
    }
}

/// Vehicle estimator: constant-velocity centre filter, scalar heading filter
/// and a low-pass filtered footprint.
///
/// Detectors often report a vehicle heading flipped by PI; measured headings
/// are folded to within PI/2 of the estimate before fusion.
#[derive(Debug, Clone)]
pub struct VehicleModel {
    profile: VehicleProfile,
    filter: ConstantVelocityFilter,
    yaw: f64,
    yaw_variance: f64,
    z: f64,
    shape: Shape,
    existence: ExistenceEstimator,
}

impl VehicleModel {
    /// Returns a new VehicleModel initialised from a validated detection.
    pub fn new(detection: &Detection, profile: VehicleProfile, params: &ClassParams) -> VehicleModel {
        let pose = detection.pose();
        VehicleModel {
            profile,
            filter: ConstantVelocityFilter::initiate(
                Vector2::new(pose.x(), pose.y()),
                profile.position_std,
                profile.velocity_std,
                profile.acceleration_std,
                profile.measurement_std,
            ),
            yaw: pose.yaw(),
            yaw_variance: profile.yaw_std.powi(2),
            z: pose.z(),
            shape: *detection.shape(),
            existence: ExistenceEstimator::new(
                detection.confidence(),
                params.existence_time_constant,
                params.existence_gain,
            ),
        }
    }

    fn fold_heading(&self, measured: f64) -> f64 {
        let diff = wrap_angle(measured - self.yaw);
        if diff.abs() > FRAC_PI_2 {
            wrap_angle(measured + PI)
        } else {
            measured
        }
    }
}

impl MotionModel for VehicleModel {
    fn name(&self) -> &'static str {
        self.profile.name
    }

    fn clone_box(&self) -> Box<dyn MotionModel> {
        Box::new(self.clone())
    }

    fn predict(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.filter.predict(dt);
        self.yaw_variance += (self.profile.yaw_rate_std * dt).powi(2);
        self.existence.predict(dt);
    }

    fn correct(&mut self, detection: &Detection) -> Result<(), DetectionDefect> {
        detection.validate()?;
        let pose = detection.pose();

        if !self.filter.update(&Vector2::new(pose.x(), pose.y())) {
            return Err(DetectionDefect::NonFinitePose);
        }

        let measured = self.fold_heading(pose.yaw());
        let yaw_gain =
            self.yaw_variance / (self.yaw_variance + self.profile.yaw_measurement_std.powi(2));
        self.yaw = wrap_angle(self.yaw + yaw_gain * wrap_angle(measured - self.yaw));
        self.yaw_variance *= 1.0 - yaw_gain;

        self.z += self.profile.shape_gain * (pose.z() - self.z);
        self.shape = self.shape.blend(detection.shape(), self.profile.shape_gain);
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
