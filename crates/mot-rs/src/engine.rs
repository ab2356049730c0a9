use crate::{
    diagnostics::DiagnosticsRecorder,
    gating::{CostEvaluator, CostFunction},
    geometry::is_finite_transform,
    lifecycle::{LifecycleManager, LifecycleReport},
    linear_assignment::min_cost_matching,
    Detection, Diagnostics, Track, TrackId, TrackedObject, TrackerConfig, TrackerError,
};
use nalgebra::Isometry3;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, error, warn};

/// One batch of detections from the sensor-fusion front end.
#[derive(Debug, Clone)]
pub struct MeasurementBatch {
    /// Acquisition time of the detections (s).
    pub timestamp: f64,
    /// Detections in the sensor frame.
    pub detections: Vec<Detection>,
    /// Transform from the sensor frame to the tracking world frame at `timestamp`, if it could be looked up.
    pub sensor_to_world: Option<Isometry3<f64>>,
}

impl MeasurementBatch {
    /// Returns a new MeasurementBatch
    ///
    /// # Parameters
    ///
    /// * `timestamp`: Acquisition time of the detections.
    /// * `detections`: Detections in the sensor frame.
    /// * `sensor_to_world`: Sensor-to-world transform, `None` if the lookup failed.
    pub fn new(
        timestamp: f64,
        detections: Vec<Detection>,
        sensor_to_world: Option<Isometry3<f64>>,
    ) -> MeasurementBatch {
        MeasurementBatch {
            timestamp,
            detections,
            sensor_to_world,
        }
    }
}

/// Outcome of one measurement cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementReport {
    pub timestamp: f64,
    /// Number of detections associated to an existing track.
    pub matched: usize,
    pub created: Vec<TrackId>,
    pub confirmed: Vec<TrackId>,
    pub merged: Vec<TrackId>,
    pub removed: Vec<TrackId>,
    /// Detections dropped for degenerate geometry before association.
    pub dropped_detections: usize,
    /// True if part of the association was solved greedily.
    pub degraded: bool,
}

/// Tracks published at one tick, ordered by identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedObjects {
    pub timestamp: f64,
    /// Confirmed tracks.
    pub objects: Vec<TrackedObject>,
    /// Tentative tracks, only filled when tentative publication is enabled.
    pub tentative: Vec<TrackedObject>,
}

#[derive(Debug)]
struct EngineState {
    /// Live tracks, ordered by identifier.
    tracks: Vec<Track>,
    lifecycle: LifecycleManager,
    /// Latest batch time the tracks were predicted to, processed or rejected for its transform.
    /// Older batches are out of order.
    last_measurement: Option<f64>,
}

impl EngineState {
    fn status_counts(&self) -> (usize, usize) {
        self.tracks.iter().fold((0, 0), |(tentative, confirmed), track| {
            (
                tentative + usize::from(track.is_tentative()),
                confirmed + usize::from(track.is_confirmed()),
            )
        })
    }
}

/// This is the multi-object tracking engine.
///
/// Both entry points may be called from different threads. The track
/// collection is guarded by a single lock held for the whole of a measurement
/// cycle or publish tick, so a snapshot never observes a half-applied cycle.
///
/// # Examples
///
/// ```
/// use mot_rs::{
///     planar_transform, Detection, MeasurementBatch, ObjectClass, Pose, Shape, TrackerConfig,
///     TrackingEngine,
/// };
///
/// let engine = TrackingEngine::new(TrackerConfig::default()).unwrap();
///
/// for t in [0.0, 0.1, 0.2] {
///     let detection = Detection::new(
///         None,
///         ObjectClass::Car,
///         Pose::new(10.0, 0.0, 0.0, 0.0),
///         Shape::new(4.5, 1.9, 1.6),
///         0.9,
///     );
///     let batch = MeasurementBatch::new(t, vec![detection], Some(planar_transform(0.0, 0.0, 0.0)));
///     engine.on_measurement(batch).unwrap();
/// }
///
/// let published = engine.on_publish_tick(0.25).unwrap();
/// for object in &published.objects {
///     println!("{} {} {:?}", object.track_id, object.class, object.pose);
/// }
/// ```
pub struct TrackingEngine {
    config: TrackerConfig,
    evaluator: CostEvaluator,
    state: Mutex<EngineState>,
    diagnostics: Mutex<DiagnosticsRecorder>,
}

impl TrackingEngine {
    /// Returns a new TrackingEngine with the default gating and cost.
    ///
    /// # Parameters
    ///
    /// * `config`: Engine configuration, validated here.
    pub fn new(config: TrackerConfig) -> Result<TrackingEngine, TrackerError> {
        TrackingEngine::with_cost_function(config, CostEvaluator::default())
    }

    /// Returns a new TrackingEngine with a custom cost evaluator.
    ///
    /// # Parameters
    ///
    /// * `config`: Engine configuration, validated here.
    /// * `evaluator`: Gate and cost of track/detection pairs.
    pub fn with_cost_function(
        config: TrackerConfig,
        evaluator: CostEvaluator,
    ) -> Result<TrackingEngine, TrackerError> {
        config.validate()?;
        Ok(TrackingEngine {
            evaluator,
            state: Mutex::new(EngineState {
                tracks: Vec::new(),
                lifecycle: LifecycleManager::new(config.clone()),
                last_measurement: None,
            }),
            diagnostics: Mutex::new(DiagnosticsRecorder::default()),
            config,
        })
    }

    /// Returns a new TrackingEngine gating pairs with `cost_function`.
    pub fn with_cost(
        config: TrackerConfig,
        cost_function: Box<dyn CostFunction>,
    ) -> Result<TrackingEngine, TrackerError> {
        TrackingEngine::with_cost_function(config, CostEvaluator::new(cost_function))
    }

    /// Return the configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Process one measurement batch: predict, associate and update the tracks.
    ///
    /// A batch without a usable transform is rejected, but the tracks are still
    /// predicted to its timestamp so that unlikely tracks expire.
    pub fn on_measurement(&self, batch: MeasurementBatch) -> Result<MeasurementReport, TrackerError> {
        let started = Instant::now();
        let timestamp = batch.timestamp;

        if !timestamp.is_finite() {
            warn!(timestamp, "measurement batch rejected");
            self.diagnostics.lock().record_rejection();
            return Err(TrackerError::InvalidTimestamp(timestamp));
        }

        let transform = match batch.sensor_to_world {
            Some(transform) if is_finite_transform(&transform) => transform,
            Some(_) => return self.reject(TrackerError::NonFiniteTransform { timestamp }),
            None => return self.reject(TrackerError::TransformUnavailable { timestamp }),
        };

        let detection_count = batch.detections.len();
        let detections = batch
            .detections
            .iter()
            .map(|detection| detection.transformed(&transform))
            .filter(|detection| match detection.validate() {
                Ok(()) => true,
                Err(defect) => {
                    warn!(detection = %detection.id(), %defect, "degenerate detection dropped");
                    false
                }
            })
            .collect::<Vec<_>>();
        let dropped_detections = detection_count - detections.len();

        let mut state = self.state.lock();

        let last_measurement = state.last_measurement;
        if let Some(last) = last_measurement {
            if timestamp < last {
                drop(state);
                warn!(timestamp, last, "out-of-order measurement batch rejected");
                self.diagnostics.lock().record_rejection();
                return Err(TrackerError::OutOfOrder { timestamp, last });
            }
        }

        let cycle = self.run_cycle(&mut state, &detections, timestamp);
        let counts = state.status_counts();
        drop(state);

        if dropped_detections > 0 {
            self.diagnostics.lock().record_dropped(dropped_detections);
        }

        let (matched, lifecycle, degraded) = match cycle {
            Ok(cycle) => cycle,
            Err(err) => {
                error!(timestamp, %err, "measurement cycle aborted");
                self.diagnostics.lock().record_fault();
                return Err(err);
            }
        };

        if degraded {
            warn!(timestamp, "association degraded to greedy matching");
        }
        debug!(
            timestamp,
            detections = detections.len(),
            matched,
            created = lifecycle.created.len(),
            removed = lifecycle.removed.len(),
            tentative = counts.0,
            confirmed = counts.1,
            "measurement cycle"
        );
        self.diagnostics
            .lock()
            .record_cycle(timestamp, started.elapsed(), degraded, counts);

        Ok(MeasurementReport {
            timestamp,
            matched,
            created: lifecycle.created,
            confirmed: lifecycle.confirmed,
            merged: lifecycle.merged,
            removed: lifecycle.removed,
            dropped_detections,
            degraded,
        })
    }

    /// Predict, associate, apply the lifecycle, suppress duplicates and prune.
    fn run_cycle(
        &self,
        state: &mut EngineState,
        detections: &[Detection],
        timestamp: f64,
    ) -> Result<(usize, LifecycleReport, bool), TrackerError> {
        let EngineState {
            tracks,
            lifecycle,
            last_measurement,
        } = state;
        let mut report = LifecycleReport::default();

        tracks.iter_mut().for_each(|track| {
            track.predict_to(timestamp);
        });

        let costs = self
            .evaluator
            .evaluate(tracks, detections, &self.config.classes);
        let association = min_cost_matching(&costs, self.config.max_problem_size)?;

        lifecycle.apply_association(tracks, detections, &association, timestamp, &mut report)?;
        lifecycle.create_tracks(
            tracks,
            detections,
            &association.unmatched_detections,
            timestamp,
            &mut report,
        )?;
        lifecycle.suppress_duplicates(tracks, &mut report);
        lifecycle.prune(tracks, &mut report);

        *last_measurement = Some(timestamp);

        Ok((association.matches.len(), report, association.degraded))
    }

    /// Reject a batch without a usable transform, still letting the tracks coast to its timestamp.
    fn reject(&self, err: TrackerError) -> Result<MeasurementReport, TrackerError> {
        let timestamp = match err {
            TrackerError::TransformUnavailable { timestamp }
            | TrackerError::NonFiniteTransform { timestamp } => Some(timestamp),
            _ => None,
        };

        if let Some(timestamp) = timestamp {
            let mut state = self.state.lock();
            let EngineState {
                tracks,
                lifecycle,
                last_measurement,
            } = &mut *state;
            // a batch older than the tracks does not move them
            if last_measurement.map_or(true, |last| timestamp >= last) {
                tracks.iter_mut().for_each(|track| {
                    track.predict_to(timestamp);
                });
                lifecycle.expire_unlikely(tracks);
                lifecycle.prune(tracks, &mut LifecycleReport::default());
                *last_measurement = Some(timestamp);
            }
        }

        warn!(%err, "measurement batch rejected");
        self.diagnostics.lock().record_rejection();
        Err(err)
    }

    /// Collect the tracks to publish at `timestamp`.
    ///
    /// Every published object is predicted to `timestamp` on a copy of its
    /// estimator, so the tick cadence never changes the tracks themselves.
    pub fn on_publish_tick(&self, timestamp: f64) -> Result<PublishedObjects, TrackerError> {
        if !timestamp.is_finite() {
            return Err(TrackerError::InvalidTimestamp(timestamp));
        }
        let started = Instant::now();

        let state = self.state.lock();
        let objects = state
            .tracks
            .iter()
            .filter(|track| state.lifecycle.is_published(track))
            .map(|track| track.predicted(timestamp))
            .collect::<Vec<_>>();
        let tentative = state
            .tracks
            .iter()
            .filter(|track| state.lifecycle.is_surfaced_tentative(track))
            .map(|track| track.predicted(timestamp))
            .collect::<Vec<_>>();
        let counts = state.status_counts();
        drop(state);

        let mut published = PublishedObjects {
            timestamp,
            objects,
            tentative,
        };
        published.objects.sort_by_key(|object| object.track_id);
        published.tentative.sort_by_key(|object| object.track_id);

        self.diagnostics
            .lock()
            .record_tick(started.elapsed(), counts);

        Ok(published)
    }

    /// Returns every live track at its own state time, tentative ones included.
    pub fn tracks(&self) -> Vec<TrackedObject> {
        self.state
            .lock()
            .tracks
            .iter()
            .map(Track::to_tracked_object)
            .collect()
    }

    /// Returns a snapshot of the engine health as of `now`.
    pub fn diagnostics(&self, now: f64) -> Diagnostics {
        self.diagnostics.lock().snapshot(
            now,
            self.config.diagnostics_warn_delay,
            self.config.diagnostics_error_delay,
        )
    }
}
