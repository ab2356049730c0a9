/// Probability that a track corresponds to a real object.
///
/// Decays exponentially while the track coasts and recovers with every
/// associated detection, weighted by the detection confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExistenceEstimator {
    probability: f64,
    time_constant: f64,
    gain: f64,
}

const MAX_PROBABILITY: f64 = 0.999;

impl ExistenceEstimator {
    /// Returns a new ExistenceEstimator seeded from the confidence of the first detection.
    ///
    /// # Parameters
    ///
    /// * `confidence`: Confidence of the detection that created the track.
    /// * `time_constant`: Decay time constant (s) while no detection is associated.
    /// * `gain`: Fraction of the remaining doubt removed by a fully confident detection.
    pub fn new(confidence: f64, time_constant: f64, gain: f64) -> ExistenceEstimator {
        ExistenceEstimator {
            probability: (gain * confidence.clamp(0.0, 1.0)).min(MAX_PROBABILITY),
            time_constant,
            gain,
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn predict(&mut self, dt: f64) {
        if dt.is_finite() && dt > 0.0 {
            self.probability *= (-dt / self.time_constant).exp();
        }
    }

    pub fn correct(&mut self, confidence: f64) {
        let confidence = confidence.clamp(0.0, 1.0);
        self.probability = (self.probability + (1.0 - self.probability) * self.gain * confidence)
            .min(MAX_PROBABILITY);
    }
}
