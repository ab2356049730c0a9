use nalgebra::{Matrix2, Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4};

/**
A Kalman filter for tracking planar object motion in the world frame.

The 4-dimensional state space:
    x, y, vx, vy
contains the object centre position (x, y) and its velocity.

Object motion follows a constant velocity model driven by white-noise acceleration. The centre position (x, y) is taken as direct observation of the state space (linear observation model).
*/
#[derive(Debug, Clone)]
pub struct ConstantVelocityFilter {
    mean: Vector4<f64>,
    covariance: Matrix4<f64>,
    update_mat: Matrix2x4<f64>,
    /// Standard deviation of the white-noise acceleration (m/s²).
    acceleration_std: f64,
    /// Standard deviation of a position measurement (m).
    measurement_std: f64,
}

impl ConstantVelocityFilter {
    /// Create a filter from an unassociated measurement.
    ///
    /// # Arguments
    ///
    /// - `position`: The measured centre position.
    /// - `position_std`: Initial position uncertainty (1σ, m).
    /// - `velocity_std`: Initial velocity uncertainty (1σ, m/s). Unobserved velocities are initialized to 0 mean.
    /// - `acceleration_std`: Process noise (1σ, m/s²).
    /// - `measurement_std`: Measurement noise (1σ, m).
    pub fn initiate(
        position: Vector2<f64>,
        position_std: f64,
        velocity_std: f64,
        acceleration_std: f64,
        measurement_std: f64,
    ) -> ConstantVelocityFilter {
        let mean = Vector4::new(position.x, position.y, 0.0, 0.0);
        let covariance = Matrix4::from_diagonal(&Vector4::new(
            position_std.powi(2),
            position_std.powi(2),
            velocity_std.powi(2),
            velocity_std.powi(2),
        ));

        #[rustfmt::skip]
        let update_mat = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );

        ConstantVelocityFilter {
            mean,
            covariance,
            update_mat,
            acceleration_std,
            measurement_std,
        }
    }

    /// Return the mean of the filter
    pub fn mean(&self) -> &Vector4<f64> {
        &self.mean
    }

    /// Return the covariance of the filter
    pub fn covariance(&self) -> &Matrix4<f64> {
        &self.covariance
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.mean[0], self.mean[1])
    }

    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.mean[2], self.mean[3])
    }

    pub fn position_covariance(&self) -> Matrix2<f64> {
        self.covariance.fixed_view::<2, 2>(0, 0).into_owned()
    }

    fn measurement_cov(&self) -> Matrix2<f64> {
        Matrix2::from_diagonal_element(self.measurement_std.powi(2))
    }

    /// Run Kalman filter prediction step over `dt` seconds.
    ///
    /// Non-positive or non-finite `dt` leaves the filter untouched, as does a
    /// prediction that would produce non-finite values.
    pub fn predict(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }

        let mut motion_mat = Matrix4::<f64>::identity();
        motion_mat[(0, 2)] = dt;
        motion_mat[(1, 3)] = dt;

        // discrete white-noise acceleration, independent per axis
        let q = self.acceleration_std.powi(2);
        let mut motion_cov = Matrix4::<f64>::zeros();
        for axis in 0..2 {
            motion_cov[(axis, axis)] = q * dt.powi(4) / 4.0;
            motion_cov[(axis, axis + 2)] = q * dt.powi(3) / 2.0;
            motion_cov[(axis + 2, axis)] = q * dt.powi(3) / 2.0;
            motion_cov[(axis + 2, axis + 2)] = q * dt.powi(2);
        }

        let mean = motion_mat * self.mean;
        let covariance = motion_mat * self.covariance * motion_mat.transpose() + motion_cov;

        if mean.iter().chain(covariance.iter()).all(|v| v.is_finite()) {
            self.mean = mean;
            self.covariance = 0.5 * (covariance + covariance.transpose());
        }
    }

    /// Project state distribution to measurement space.
    ///
    /// # Returns
    ///
    /// A tuple with the projected mean (2 dimensional) and the innovation covariance (2x2 dimensional).
    pub fn project(&self) -> (Vector2<f64>, Matrix2<f64>) {
        let mean = self.update_mat * self.mean;
        let covariance =
            self.update_mat * self.covariance * self.update_mat.transpose() + self.measurement_cov();
        (mean, covariance)
    }

    /// Run Kalman filter correction step with a measured centre position.
    ///
    /// Returns false, leaving the filter untouched, if the measurement is not
    /// finite or the innovation covariance is not positive definite.
    pub fn update(&mut self, measurement: &Vector2<f64>) -> bool {
        if !measurement.iter().all(|v| v.is_finite()) {
            return false;
        }

        let (projected_mean, projected_cov) = self.project();
        let Some(cholesky_factor) = projected_cov.cholesky() else {
            return false;
        };

        // K = P Hᵀ S⁻¹, solved as (S⁻¹ H P)ᵀ since S and P are symmetric
        let kalman_gain: Matrix4x2<f64> = cholesky_factor
            .solve(&(self.update_mat * self.covariance))
            .transpose();

        let innovation = measurement - projected_mean;
        let mean = self.mean + kalman_gain * innovation;

        // Joseph form keeps the covariance symmetric positive semi-definite
        let residual = Matrix4::<f64>::identity() - kalman_gain * self.update_mat;
        let covariance = residual * self.covariance * residual.transpose()
            + kalman_gain * self.measurement_cov() * kalman_gain.transpose();

        if mean.iter().chain(covariance.iter()).all(|v| v.is_finite()) {
            self.mean = mean;
            self.covariance = 0.5 * (covariance + covariance.transpose());
            true
        } else {
            false
        }
    }

    /// Compute the squared Mahalanobis distance between the projected state and a measured centre position.
    ///
    /// Returns infinity if the innovation covariance is not positive definite.
    pub fn gating_distance(&self, measurement: &Vector2<f64>) -> f64 {
        let (mean, covariance) = self.project();
        match covariance.cholesky() {
            Some(cholesky_factor) => {
                let d = measurement - mean;
                d.dot(&cholesky_factor.solve(&d))
            }
            None => f64::INFINITY,
        }
    }
}
