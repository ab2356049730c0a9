use std::fmt;
use std::hash::{Hash, Hasher};

use crate::{
    geometry::footprint_tlbr,
    motion_model::{MotionModel, ObjectState},
    Detection, DetectionDefect, ObjectClass, Pose, Shape, Velocity,
};
use nalgebra::Matrix2;
use ndarray::Array1;
use serde::Serialize;

/// Weight of a new detection in the class probabilities of a track.
const CLASSIFICATION_GAIN: f64 = 0.3;

/// Identifier of a track. Allocated in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enumeration type for the single target track state:
///
/// - Newly created tracks are classified as `Tentative` until enough evidence has been collected.
/// - Then, the track state is changed to `Confirmed` and the track is published.
/// - Tracks that are no longer alive are classified as `Stale` to mark them for removal from the set of live tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Tentative,
    Confirmed,
    Stale,
}

/// A single target track: the hypothesis that one real object exists, with its estimator and bookkeeping.
pub struct Track {
    /// A unique track identifier.
    track_id: TrackId,
    /// The current lifecycle state.
    status: TrackStatus,
    /// Estimator of the object state, chosen by class at creation.
    model: Box<dyn MotionModel>,
    /// Smoothed probability of each class, indexed by `ObjectClass::index`.
    class_probabilities: [f64; ObjectClass::ALL.len()],
    /// Time the track was created.
    created_at: f64,
    /// Time of the latest associated detection.
    last_matched_at: f64,
    /// Time the estimator has been predicted to.
    state_time: f64,
    /// Consecutive cycles without an associated detection.
    misses: u32,
    /// Consecutive cycles with an associated detection, creation included.
    hits: u32,
    /// Total number of associated detections, creation included.
    total_hits: u32,
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("track_id", &self.track_id)
            .field("status", &self.status)
            .field("class", &self.class())
            .field("model", &self.model.name())
            .field("state_time", &self.state_time)
            .field("misses", &self.misses)
            .field("hits", &self.hits)
            .field("total_hits", &self.total_hits)
            .field("existence", &self.existence_probability())
            .finish()
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.track_id == other.track_id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.track_id.hash(state);
    }
}

impl Track {
    /// Returns a new tentative Track
    ///
    /// # Parameters
    ///
    /// * `track_id`: A unique track identifier.
    /// * `detection`: The detection this track originates from. Counts as the first hit.
    /// * `model`: The estimator initialised from `detection`.
    /// * `time`: Timestamp of the detection.
    pub fn new(
        track_id: TrackId,
        detection: &Detection,
        model: Box<dyn MotionModel>,
        time: f64,
    ) -> Track {
        let mut class_probabilities = [0.0; ObjectClass::ALL.len()];
        class_probabilities[detection.class().index()] = 1.0;

        Track {
            track_id,
            status: TrackStatus::Tentative,
            model,
            class_probabilities,
            created_at: time,
            last_matched_at: time,
            state_time: time,
            misses: 0,
            hits: 1,
            total_hits: 1,
        }
    }

    /// Return the identifier of the track
    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    /// Return the lifecycle state of the track
    pub fn status(&self) -> TrackStatus {
        self.status
    }

    /// Return the most probable class of the track
    pub fn class(&self) -> ObjectClass {
        // first maximum wins, so ties resolve to the lower label
        ObjectClass::ALL
            .iter()
            .copied()
            .fold(ObjectClass::Unknown, |best, class| {
                if self.class_probabilities[class.index()]
                    > self.class_probabilities[best.index()]
                {
                    class
                } else {
                    best
                }
            })
    }

    /// Return the smoothed probability of one class
    pub fn class_probability(&self, class: ObjectClass) -> f64 {
        self.class_probabilities[class.index()]
    }

    /// Return the current best estimate of the object state
    pub fn state(&self) -> ObjectState {
        self.model.state()
    }

    pub fn model(&self) -> &dyn MotionModel {
        self.model.as_ref()
    }

    pub fn existence_probability(&self) -> f64 {
        self.model.existence_probability()
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn last_matched_at(&self) -> f64 {
        self.last_matched_at
    }

    /// Return the time the estimator has been predicted to
    pub fn state_time(&self) -> f64 {
        self.state_time
    }

    /// Return the number of consecutive missed cycles
    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// Return the number of consecutive matched cycles
    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn total_hits(&self) -> u32 {
        self.total_hits
    }

    /// Returns the axis-aligned extent of the track footprint, `(min x, min y, max x, max y)`.
    pub fn footprint_tlbr(&self) -> Array1<f64> {
        let state = self.state();
        footprint_tlbr(&state.pose, &state.shape)
    }

    /// Propagate the state distribution to `time`. Never predicts backwards.
    ///
    /// Returns the elapsed time that was applied.
    pub fn predict_to(&mut self, time: f64) -> f64 {
        let dt = time - self.state_time;
        if dt.is_finite() && dt > 0.0 {
            self.model.predict(dt);
            self.state_time = time;
            dt
        } else {
            0.0
        }
    }

    /// Fuse an associated detection and count the hit.
    ///
    /// The hit is counted even if the estimator refuses the detection.
    pub fn update(&mut self, detection: &Detection, time: f64) -> Result<(), DetectionDefect> {
        let corrected = self.model.correct(detection);

        if detection.class() != ObjectClass::Unknown {
            self.class_probabilities
                .iter_mut()
                .for_each(|p| *p *= 1.0 - CLASSIFICATION_GAIN);
            self.class_probabilities[detection.class().index()] += CLASSIFICATION_GAIN;
        }

        self.misses = 0;
        self.hits = self.hits.saturating_add(1);
        self.total_hits = self.total_hits.saturating_add(1);
        self.last_matched_at = time;

        corrected
    }

    /// Count a cycle without an associated detection.
    pub fn mark_missed(&mut self) {
        self.misses = self.misses.saturating_add(1);
        self.hits = 0;
    }

    /// Mark this track as confirmed.
    pub fn mark_confirmed(&mut self) {
        self.status = TrackStatus::Confirmed;
    }

    /// Mark this track as stale, pending removal.
    pub fn mark_stale(&mut self) {
        self.status = TrackStatus::Stale;
    }

    /// Returns true if this track is tentative (unconfirmed).
    pub fn is_tentative(&self) -> bool {
        matches!(self.status, TrackStatus::Tentative)
    }

    /// Returns true if this track is confirmed.
    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, TrackStatus::Confirmed)
    }

    /// Returns true if this track is stale and should be removed.
    pub fn is_stale(&self) -> bool {
        matches!(self.status, TrackStatus::Stale)
    }

    /// Returns an owned snapshot of the track at its state time.
    pub fn to_tracked_object(&self) -> TrackedObject {
        self.snapshot(self.model.as_ref(), self.state_time)
    }

    /// Returns an owned snapshot of the track predicted to `time`, leaving the track untouched.
    ///
    /// A `time` before the state time yields the state at the state time.
    pub fn predicted(&self, time: f64) -> TrackedObject {
        let dt = time - self.state_time;
        if dt.is_finite() && dt > 0.0 {
            let mut model = self.model.clone_box();
            model.predict(dt);
            self.snapshot(model.as_ref(), time)
        } else {
            self.to_tracked_object()
        }
    }

    fn snapshot(&self, model: &dyn MotionModel, timestamp: f64) -> TrackedObject {
        let state = model.state();
        TrackedObject {
            track_id: self.track_id,
            class: self.class(),
            status: self.status,
            timestamp,
            pose: state.pose,
            velocity: state.velocity,
            shape: state.shape,
            position_covariance: state.position_covariance,
            confidence: model.existence_probability(),
        }
    }
}

/// A published track: an owned copy taken under the engine lock.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    pub track_id: TrackId,
    pub class: ObjectClass,
    pub status: TrackStatus,
    /// Time the state was predicted to.
    pub timestamp: f64,
    pub pose: Pose,
    pub velocity: Velocity,
    pub shape: Shape,
    pub position_covariance: Matrix2<f64>,
    /// Existence probability of the track.
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use crate::motion_model::{self, tests::detection};
    use crate::*;
    use anyhow::Result;
    use assert_approx_eq::assert_approx_eq;

    fn track(class: ObjectClass) -> Result<Track> {
        let detection = detection(class, 1.0, 2.0, 0.0);
        let model = motion_model::create(&detection, &ClassParams::for_class(class))?;
        Ok(Track::new(TrackId(7), &detection, model, 10.0))
    }

    #[test]
    fn new() -> Result<()> {
        let track = track(ObjectClass::Car)?;
        assert!(track.is_tentative());
        assert_eq!(track.status(), TrackStatus::Tentative);
        assert_eq!(track.created_at(), 10.0);
        assert_eq!(track.hits(), 1);
        assert_eq!(track.total_hits(), 1);
        assert_eq!(track.misses(), 0);
        assert_eq!(track.class(), ObjectClass::Car);
        assert_eq!(track.state_time(), 10.0);
        Ok(())
    }

    #[test]
    fn predict_to_never_goes_backwards() -> Result<()> {
        let mut track = track(ObjectClass::Car)?;
        assert_approx_eq!(track.predict_to(10.5), 0.5);
        assert_eq!(track.predict_to(10.2), 0.0);
        assert_eq!(track.state_time(), 10.5);
        assert_eq!(track.predict_to(f64::NAN), 0.0);
        Ok(())
    }

    #[test]
    fn hits_and_misses() -> Result<()> {
        let mut track = track(ObjectClass::Car)?;
        track.mark_missed();
        track.mark_missed();
        assert_eq!(track.misses(), 2);
        assert_eq!(track.hits(), 0);

        track.update(&detection(ObjectClass::Car, 1.0, 2.0, 0.0), 11.0)?;
        assert_eq!(track.misses(), 0);
        assert_eq!(track.hits(), 1);
        assert_eq!(track.total_hits(), 2);
        assert_eq!(track.last_matched_at(), 11.0);
        Ok(())
    }

    #[test]
    fn degenerate_update_still_counts_the_hit() -> Result<()> {
        let mut track = track(ObjectClass::Car)?;
        let state = track.state();
        let flat = Detection::new(
            None,
            ObjectClass::Car,
            Pose::new(1.0, 2.0, 0.0, 0.0),
            Shape::new(4.0, 0.0, 1.0),
            0.9,
        );
        assert_eq!(
            track.update(&flat, 10.1),
            Err(DetectionDefect::DegenerateExtent)
        );
        assert_eq!(track.state(), state);
        assert_eq!(track.hits(), 2);
        Ok(())
    }

    #[test]
    fn classification_follows_detections() -> Result<()> {
        let mut track = track(ObjectClass::Unknown)?;
        assert_eq!(track.class(), ObjectClass::Unknown);

        track.update(&detection(ObjectClass::Truck, 1.0, 2.0, 0.0), 10.1)?;
        assert_eq!(track.class(), ObjectClass::Unknown);
        track.update(&detection(ObjectClass::Truck, 1.0, 2.0, 0.0), 10.2)?;
        assert_eq!(track.class(), ObjectClass::Truck);

        // unknown detections carry no class evidence
        track.update(&detection(ObjectClass::Unknown, 1.0, 2.0, 0.0), 10.3)?;
        assert_eq!(track.class(), ObjectClass::Truck);
        assert_approx_eq!(track.class_probability(ObjectClass::Truck), 0.51);
        Ok(())
    }

    #[test]
    fn to_tracked_object() -> Result<()> {
        let mut track = track(ObjectClass::Car)?;
        track.mark_confirmed();
        track.predict_to(10.25);

        let object = track.to_tracked_object();
        assert_eq!(object.track_id, TrackId(7));
        assert_eq!(object.status, TrackStatus::Confirmed);
        assert_eq!(object.timestamp, 10.25);
        assert_approx_eq!(object.pose.x(), 1.0);
        assert_approx_eq!(object.confidence, track.existence_probability());
        Ok(())
    }

    #[test]
    fn predicted_leaves_the_track_untouched() -> Result<()> {
        let mut track = track(ObjectClass::Car)?;
        track.predict_to(10.5);
        let before = track.to_tracked_object();

        let predicted = track.predicted(11.0);
        assert_eq!(predicted.timestamp, 11.0);
        assert!(predicted.position_covariance.trace() > before.position_covariance.trace());
        assert!(predicted.confidence < before.confidence);
        assert_eq!(track.to_tracked_object(), before);

        // never backwards
        assert_eq!(track.predicted(10.0), before);
        Ok(())
    }
}
