use crate::{gating::CHI2INV99, motion_model::ModelKind, ObjectClass, TrackerError};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

/// Slowest publish timer accepted (one tick every 100 s).
pub const MIN_PUBLISH_RATE_HZ: f64 = 0.01;

/// Fastest publish timer accepted.
pub const MAX_PUBLISH_RATE_HZ: f64 = 1000.0;

/// Tuning parameters that depend on the object class of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassParams {
    /// Estimator of the tracks started by detections of this class.
    pub model: ModelKind,
    /// Squared Mahalanobis distance above which a pair is gated out.
    pub gate_chi2: f64,
    /// Planar centre distance (m) above which a pair is gated out.
    pub max_distance: f64,
    /// Smallest detection footprint area (m²) a track of this class may explain.
    pub min_area: f64,
    /// Largest detection footprint area (m²) a track of this class may explain.
    pub max_area: f64,
    /// Largest heading difference (rad, modulo PI) between track and detection.
    pub max_yaw_diff: Option<f64>,
    /// Consecutive matched cycles, creation included, before a track is confirmed.
    pub confirmation_hits: u32,
    /// Consecutive misses a confirmed track survives.
    pub max_misses: u32,
    /// Consecutive misses a tentative track survives.
    pub max_tentative_misses: u32,
    /// Detections below this confidence never start a track.
    pub min_creation_confidence: f64,
    /// Tracks whose existence probability falls below this value become stale.
    pub min_existence_probability: f64,
    /// Time constant (s) of the existence probability decay while coasting.
    pub existence_time_constant: f64,
    /// Fraction of the remaining doubt removed by a fully confident match.
    pub existence_gain: f64,
}

impl ClassParams {
    /// Returns the default parameters for a class.
    pub fn for_class(class: ObjectClass) -> ClassParams {
        let base = ClassParams {
            model: ModelKind::for_class(class),
            gate_chi2: CHI2INV99[&2],
            max_distance: 5.0,
            min_area: 0.0,
            max_area: 200.0,
            max_yaw_diff: None,
            confirmation_hits: 3,
            max_misses: 5,
            max_tentative_misses: 1,
            min_creation_confidence: 0.3,
            min_existence_probability: 0.02,
            existence_time_constant: 2.0,
            existence_gain: 0.5,
        };

        match class {
            ObjectClass::Car => ClassParams {
                max_distance: 8.0,
                min_area: 2.0,
                max_area: 40.0,
                max_yaw_diff: Some(1.047),
                ..base
            },
            ObjectClass::Truck | ObjectClass::Bus | ObjectClass::Trailer => ClassParams {
                max_distance: 10.0,
                min_area: 4.0,
                max_area: 200.0,
                max_yaw_diff: Some(1.047),
                ..base
            },
            ObjectClass::Motorcycle | ObjectClass::Bicycle => ClassParams {
                max_distance: 4.0,
                min_area: 0.2,
                max_area: 8.0,
                existence_time_constant: 1.5,
                ..base
            },
            ObjectClass::Pedestrian => ClassParams {
                max_distance: 2.0,
                min_area: 0.04,
                max_area: 4.0,
                max_misses: 4,
                existence_time_constant: 1.5,
                ..base
            },
            ObjectClass::Unknown => ClassParams {
                min_creation_confidence: 0.5,
                max_misses: 3,
                existence_time_constant: 1.0,
                ..base
            },
        }
    }

    fn validate(&self, class: ObjectClass) -> Result<(), TrackerError> {
        let invalid = |what: &str| {
            Err(TrackerError::Config(format!(
                "{class}: {what} is out of range"
            )))
        };

        if !(self.gate_chi2.is_finite() && self.gate_chi2 > 0.0) {
            return invalid("gate_chi2");
        }
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return invalid("max_distance");
        }
        if !(self.min_area >= 0.0 && self.min_area <= self.max_area) {
            return invalid("min_area/max_area");
        }
        if matches!(self.max_yaw_diff, Some(v) if !(v.is_finite() && v >= 0.0)) {
            return invalid("max_yaw_diff");
        }
        if self.confirmation_hits == 0 {
            return invalid("confirmation_hits");
        }
        if !(0.0..=1.0).contains(&self.min_creation_confidence) {
            return invalid("min_creation_confidence");
        }
        if !(0.0..1.0).contains(&self.min_existence_probability) {
            return invalid("min_existence_probability");
        }
        if !(self.existence_time_constant.is_finite() && self.existence_time_constant > 0.0) {
            return invalid("existence_time_constant");
        }
        if !(0.0..=1.0).contains(&self.existence_gain) {
            return invalid("existence_gain");
        }
        Ok(())
    }
}

/// Per-class parameter overrides. Classes without an entry use [`ClassParams::for_class`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassTable(HashMap<ObjectClass, ClassParams>);

impl ClassTable {
    /// Returns the parameters for a class
    pub fn get(&self, class: ObjectClass) -> ClassParams {
        self.0
            .get(&class)
            .copied()
            .unwrap_or_else(|| ClassParams::for_class(class))
    }

    /// Overrides the parameters for a class
    pub fn with(&mut self, class: ObjectClass, params: ClassParams) -> &mut Self {
        self.0.insert(class, params);
        self
    }
}

/// Configuration of the tracking engine.
///
/// Loaded by the caller (for example with [`TrackerConfig::from_json_str`]) and
/// consumed as plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Rate of the publish timer (Hz).
    pub publish_rate_hz: f64,
    /// Largest number of tracks or detections solved optimally in one connected component.
    pub max_problem_size: usize,
    /// Surface tentative tracks in a separate list of the published snapshot.
    pub publish_tentative: bool,
    /// Tentative tracks below this existence probability are not surfaced.
    pub tentative_min_existence: f64,
    /// Footprint IoU above which two compatible tracks are duplicates.
    pub duplicate_iou_threshold: f64,
    /// Footprint IoU above which an unmatched detection is explained by an existing track.
    pub creation_overlap_threshold: f64,
    /// Seconds without measurements before diagnostics report a warning.
    pub diagnostics_warn_delay: f64,
    /// Seconds without measurements before diagnostics report an error.
    pub diagnostics_error_delay: f64,
    pub classes: ClassTable,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            publish_rate_hz: 10.0,
            max_problem_size: 128,
            publish_tentative: false,
            tentative_min_existence: 0.0,
            duplicate_iou_threshold: 0.5,
            creation_overlap_threshold: 0.5,
            diagnostics_warn_delay: 0.5,
            diagnostics_error_delay: 1.0,
            classes: ClassTable::default(),
        }
    }
}

impl TrackerConfig {
    /// Parses and validates a JSON configuration. Missing fields take their default value.
    pub fn from_json_str(json: &str) -> Result<TrackerConfig, TrackerError> {
        let config: TrackerConfig =
            serde_json::from_str(json).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the parameters for a class
    pub fn class_params(&self, class: ObjectClass) -> ClassParams {
        self.classes.get(class)
    }

    /// Period of the publish timer.
    pub fn publish_period(&self) -> Duration {
        let rate = self.publish_rate_hz.clamp(MIN_PUBLISH_RATE_HZ, MAX_PUBLISH_RATE_HZ);
        Duration::from_secs_f64(1.0 / rate)
    }

    /// Checks every value is within its meaningful range.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if !(MIN_PUBLISH_RATE_HZ..=MAX_PUBLISH_RATE_HZ).contains(&self.publish_rate_hz) {
            return Err(TrackerError::Config(format!(
                "publish_rate_hz must be within [{MIN_PUBLISH_RATE_HZ}, {MAX_PUBLISH_RATE_HZ}]"
            )));
        }
        if self.max_problem_size == 0 {
            return Err(TrackerError::Config(
                "max_problem_size must be at least 1".to_string(),
            ));
        }
        [
            ("tentative_min_existence", self.tentative_min_existence),
            ("duplicate_iou_threshold", self.duplicate_iou_threshold),
            ("creation_overlap_threshold", self.creation_overlap_threshold),
        ]
        .into_iter()
        .try_for_each(|(name, value)| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(TrackerError::Config(format!("{name} must be within [0, 1]")))
            }
        })?;
        if !(self.diagnostics_warn_delay >= 0.0
            && self.diagnostics_warn_delay <= self.diagnostics_error_delay)
        {
            return Err(TrackerError::Config(
                "diagnostics_warn_delay must not exceed diagnostics_error_delay".to_string(),
            ));
        }

        ObjectClass::ALL
            .iter()
            .try_for_each(|class| self.class_params(*class).validate(*class))
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use anyhow::Result;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        let config = TrackerConfig::default();
        config.validate()?;
        assert_eq!(config.publish_period(), Duration::from_millis(100));
        Ok(())
    }

    #[test]
    fn partial_json_keeps_defaults() -> Result<()> {
        let config = TrackerConfig::from_json_str(
            r#"{
                "publish_rate_hz": 20.0,
                "classes": {
                    "pedestrian": {
                        "model": "unknown",
                        "gate_chi2": 5.99,
                        "max_distance": 1.5,
                        "min_area": 0.0,
                        "max_area": 2.0,
                        "max_yaw_diff": null,
                        "confirmation_hits": 2,
                        "max_misses": 3,
                        "max_tentative_misses": 0,
                        "min_creation_confidence": 0.4,
                        "min_existence_probability": 0.0,
                        "existence_time_constant": 1.0,
                        "existence_gain": 0.6
                    }
                }
            }"#,
        )?;

        assert_eq!(config.publish_period(), Duration::from_millis(50));
        assert_eq!(config.max_problem_size, 128);
        assert_eq!(
            config.class_params(ObjectClass::Pedestrian).confirmation_hits,
            2
        );
        assert_eq!(
            config.class_params(ObjectClass::Pedestrian).model,
            ModelKind::Unknown
        );
        assert_eq!(
            config.class_params(ObjectClass::Car),
            ClassParams::for_class(ObjectClass::Car)
        );
        Ok(())
    }

    #[test]
    fn model_per_class() -> Result<()> {
        assert_eq!(ClassParams::for_class(ObjectClass::Truck).model, ModelKind::Vehicle);
        assert_eq!(
            ClassParams::for_class(ObjectClass::Motorcycle).model,
            ModelKind::TwoWheeler
        );
        assert_eq!(
            ClassParams::for_class(ObjectClass::Pedestrian).model,
            ModelKind::Pedestrian
        );
        assert_eq!(ClassParams::for_class(ObjectClass::Unknown).model, ModelKind::Unknown);

        let json = serde_json::to_string(&ClassParams {
            model: ModelKind::TwoWheeler,
            ..ClassParams::for_class(ObjectClass::Bicycle)
        })?;
        assert!(json.contains(r#""model":"two_wheeler""#));

        let mut config = TrackerConfig::default();
        config.classes.with(
            ObjectClass::Bicycle,
            ClassParams {
                model: ModelKind::Pedestrian,
                ..ClassParams::for_class(ObjectClass::Bicycle)
            },
        );
        let config = TrackerConfig::from_json_str(&serde_json::to_string(&config)?)?;
        assert_eq!(
            config.class_params(ObjectClass::Bicycle).model,
            ModelKind::Pedestrian
        );
        Ok(())
    }

    #[test]
    fn rejects_invalid_values() {
        for rate in ["0.0", "1e-20", "1e9"] {
            let json = format!(r#"{{ "publish_rate_hz": {rate} }}"#);
            let err = TrackerConfig::from_json_str(&json).unwrap_err();
            assert!(matches!(err, TrackerError::Config(_)), "{rate}");
        }

        let err = TrackerConfig::from_json_str(r#"{ "duplicate_iou_threshold": 1.5 }"#).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));

        let mut config = TrackerConfig::default();
        config.classes.with(
            ObjectClass::Car,
            ClassParams {
                confirmation_hits: 0,
                ..ClassParams::for_class(ObjectClass::Car)
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = TrackerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }
}
