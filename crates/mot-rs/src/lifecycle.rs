use crate::{
    iou_matching, linear_assignment::AssociationResult, motion_model, Detection, Track, TrackId,
    TrackerConfig, TrackerError,
};
use tracing::{debug, warn};

/// Track identifiers whose lifecycle changed during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleReport {
    pub created: Vec<TrackId>,
    pub confirmed: Vec<TrackId>,
    /// Tracks marked stale as the weaker of a duplicate pair.
    pub merged: Vec<TrackId>,
    pub removed: Vec<TrackId>,
}

/// Owns the track identifier counter and applies the lifecycle rules:
///
/// - Matched tracks are corrected and count a hit, unmatched tracks count a miss.
/// - `Tentative` tracks are confirmed after enough consecutive hits.
/// - Tracks become `Stale` after too many consecutive misses or when their existence probability is too low.
/// - Unexplained confident detections start new `Tentative` tracks.
/// - `Stale` tracks are removed at the end of the cycle.
#[derive(Debug)]
pub struct LifecycleManager {
    config: TrackerConfig,
    /// Used to allocate identifiers to new tracks.
    next_id: u64,
}

impl LifecycleManager {
    /// Returns a new LifecycleManager
    ///
    /// # Parameters
    ///
    /// * `config`: Thresholds of the lifecycle rules.
    pub fn new(config: TrackerConfig) -> LifecycleManager {
        LifecycleManager { config, next_id: 1 }
    }

    /// Return the identifier the next track will receive
    pub fn next_id(&self) -> TrackId {
        TrackId(self.next_id)
    }

    fn allocate_id(&mut self) -> TrackId {
        let track_id = TrackId(self.next_id);
        self.next_id += 1;
        track_id
    }

    /// Advance the state of a live track after its hit/miss counters changed.
    ///
    /// Returns true if the track was confirmed by this call.
    fn update_status(&self, track: &mut Track) -> bool {
        let params = self.config.class_params(track.class());

        if track.is_stale() {
            false
        } else if track.existence_probability() < params.min_existence_probability {
            debug!(track_id = %track.track_id(), existence = track.existence_probability(), "track is unlikely to exist");
            track.mark_stale();
            false
        } else if track.is_tentative() && track.misses() > params.max_tentative_misses {
            track.mark_stale();
            false
        } else if track.is_confirmed() && track.misses() > params.max_misses {
            track.mark_stale();
            false
        } else if track.is_tentative() && track.hits() >= params.confirmation_hits {
            track.mark_confirmed();
            true
        } else {
            false
        }
    }

    /// Apply one association round to the tracks it was computed on.
    ///
    /// # Parameters
    ///
    /// * `tracks`: The tracks, predicted to `time`. Indexed by the rows of the association.
    /// * `detections`: The detections, in the world frame. Indexed by the columns of the association.
    /// * `association`: Outcome of the solver.
    /// * `time`: Timestamp of the detections.
    pub fn apply_association(
        &self,
        tracks: &mut [Track],
        detections: &[Detection],
        association: &AssociationResult,
        time: f64,
        report: &mut LifecycleReport,
    ) -> Result<(), TrackerError> {
        let in_range = association
            .matches
            .iter()
            .all(|m| m.track_idx < tracks.len() && m.detection_idx < detections.len())
            && association
                .unmatched_tracks
                .iter()
                .all(|idx| *idx < tracks.len());
        if !in_range {
            return Err(TrackerError::Invariant(format!(
                "association does not fit {} tracks and {} detections",
                tracks.len(),
                detections.len()
            )));
        }

        for m in &association.matches {
            let track = &mut tracks[m.track_idx];
            if let Err(defect) = track.update(&detections[m.detection_idx], time) {
                warn!(track_id = %track.track_id(), %defect, "associated detection not fused");
            }
            if self.update_status(track) {
                report.confirmed.push(track.track_id());
            }
        }

        for idx in &association.unmatched_tracks {
            let track = &mut tracks[*idx];
            track.mark_missed();
            self.update_status(track);
        }

        Ok(())
    }

    /// Mark tracks whose existence probability fell below the class threshold as stale.
    ///
    /// Used when a cycle cannot associate, so that coasting tracks still expire.
    pub fn expire_unlikely(&self, tracks: &mut [Track]) {
        tracks.iter_mut().for_each(|track| {
            let params = self.config.class_params(track.class());
            if !track.is_stale() && track.existence_probability() < params.min_existence_probability
            {
                track.mark_stale();
            }
        });
    }

    /// Start tentative tracks from unmatched detections.
    ///
    /// A detection starts a track if its confidence reaches the creation
    /// threshold of its class and no live compatible track, including the ones
    /// started earlier in the same call, already overlaps its footprint.
    pub fn create_tracks(
        &mut self,
        tracks: &mut Vec<Track>,
        detections: &[Detection],
        unmatched_detections: &[usize],
        time: f64,
        report: &mut LifecycleReport,
    ) -> Result<(), TrackerError> {
        for idx in unmatched_detections {
            let detection = detections.get(*idx).ok_or_else(|| {
                TrackerError::Invariant(format!("unmatched detection {idx} does not exist"))
            })?;
            let params = self.config.class_params(detection.class());

            if detection.confidence() < params.min_creation_confidence {
                continue;
            }

            let explained = iou_matching::detection_overlap(detection, tracks)
                .iter()
                .zip(tracks.iter())
                .any(|(overlap, track)| {
                    !track.is_stale()
                        && track.class().is_compatible(&detection.class())
                        && *overlap >= self.config.creation_overlap_threshold
                });
            if explained {
                debug!(detection = %detection.id(), "detection explained by an existing track");
                continue;
            }

            let model = match motion_model::create(detection, &params) {
                Ok(model) => model,
                Err(defect) => {
                    warn!(detection = %detection.id(), %defect, "detection cannot start a track");
                    continue;
                }
            };

            let track_id = self.allocate_id();
            if tracks.iter().any(|track| track.track_id() == track_id) {
                return Err(TrackerError::DuplicateTrackId(track_id));
            }

            let mut track = Track::new(track_id, detection, model, time);
            if self.update_status(&mut track) {
                report.confirmed.push(track_id);
            }
            debug!(%track_id, class = %detection.class(), "track created");
            tracks.push(track);
            report.created.push(track_id);
        }

        Ok(())
    }

    /// Suppress duplicate tracks.
    ///
    /// For every pair of live, class-compatible tracks whose footprints overlap
    /// by at least the duplicate threshold, the weaker one is marked stale. The
    /// stronger track has the higher existence probability, then the more
    /// total hits, then the lower identifier.
    pub fn suppress_duplicates(&self, tracks: &mut [Track], report: &mut LifecycleReport) {
        let overlap = iou_matching::track_overlap(tracks);

        for i in 0..tracks.len() {
            for j in (i + 1)..tracks.len() {
                if tracks[i].is_stale()
                    || tracks[j].is_stale()
                    || overlap[[i, j]] < self.config.duplicate_iou_threshold
                    || !tracks[i].class().is_compatible(&tracks[j].class())
                {
                    continue;
                }

                let loser = if outranks(&tracks[i], &tracks[j]) { j } else { i };
                debug!(
                    kept = %tracks[i + j - loser].track_id(),
                    removed = %tracks[loser].track_id(),
                    overlap = overlap[[i, j]],
                    "duplicate track suppressed"
                );
                tracks[loser].mark_stale();
                report.merged.push(tracks[loser].track_id());
            }
        }
    }

    /// Remove stale tracks.
    pub fn prune(&self, tracks: &mut Vec<Track>, report: &mut LifecycleReport) {
        tracks.retain(|track| {
            if track.is_stale() {
                report.removed.push(track.track_id());
                false
            } else {
                true
            }
        });
    }

    /// Returns true if the track is published in the main list.
    pub fn is_published(&self, track: &Track) -> bool {
        track.is_confirmed()
    }

    /// Returns true if the track is surfaced in the separate tentative list.
    pub fn is_surfaced_tentative(&self, track: &Track) -> bool {
        self.config.publish_tentative
            && track.is_tentative()
            && track.existence_probability() >= self.config.tentative_min_existence
    }
}

/// Returns true if `a` is kept over `b` when they are duplicates.
fn outranks(a: &Track, b: &Track) -> bool {
    a.existence_probability()
        .total_cmp(&b.existence_probability())
        .then(a.total_hits().cmp(&b.total_hits()))
        .then(b.track_id().cmp(&a.track_id()))
        .is_gt()
}

#[cfg(test)]
mod tests {
    use crate::lifecycle::*;
    use crate::linear_assignment::Match;
    use crate::motion_model::tests::detection;
    use crate::*;
    use anyhow::Result;

    fn config() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.classes.with(
            ObjectClass::Car,
            ClassParams {
                min_existence_probability: 0.0,
                max_misses: 2,
                ..ClassParams::for_class(ObjectClass::Car)
            },
        );
        config
    }

    fn matched(track_idx: usize, detection_idx: usize) -> AssociationResult {
        AssociationResult {
            matches: vec![Match::new(track_idx, detection_idx, 0.1)],
            ..AssociationResult::default()
        }
    }

    fn missed(track_idx: usize) -> AssociationResult {
        AssociationResult {
            unmatched_tracks: vec![track_idx],
            ..AssociationResult::default()
        }
    }

    #[test]
    fn confirmation_after_three_consecutive_hits() -> Result<()> {
        let mut lifecycle = LifecycleManager::new(config());
        let mut report = LifecycleReport::default();
        let mut tracks = vec![];
        let detections = vec![detection(ObjectClass::Car, 0.0, 0.0, 0.0)];

        lifecycle.create_tracks(&mut tracks, &detections, &[0], 0.0, &mut report)?;
        assert_eq!(report.created, vec![TrackId(1)]);
        assert!(tracks[0].is_tentative());

        lifecycle.apply_association(&mut tracks, &detections, &matched(0, 0), 1.0, &mut report)?;
        assert!(tracks[0].is_tentative());

        lifecycle.apply_association(&mut tracks, &detections, &matched(0, 0), 2.0, &mut report)?;
        assert!(tracks[0].is_confirmed());
        assert_eq!(report.confirmed, vec![TrackId(1)]);
        Ok(())
    }

    #[test]
    fn tentative_track_dies_quickly() -> Result<()> {
        let mut lifecycle = LifecycleManager::new(config());
        let mut report = LifecycleReport::default();
        let mut tracks = vec![];
        let detections = vec![detection(ObjectClass::Car, 0.0, 0.0, 0.0)];
        lifecycle.create_tracks(&mut tracks, &detections, &[0], 0.0, &mut report)?;

        // max_tentative_misses is 1
        lifecycle.apply_association(&mut tracks, &detections, &missed(0), 1.0, &mut report)?;
        assert!(tracks[0].is_tentative());
        lifecycle.apply_association(&mut tracks, &detections, &missed(0), 2.0, &mut report)?;
        assert!(tracks[0].is_stale());

        lifecycle.prune(&mut tracks, &mut report);
        assert!(tracks.is_empty());
        assert_eq!(report.removed, vec![TrackId(1)]);
        Ok(())
    }

    #[test]
    fn confirmed_track_is_stale_after_max_misses_plus_one() -> Result<()> {
        let mut lifecycle = LifecycleManager::new(config());
        let mut report = LifecycleReport::default();
        let mut tracks = vec![];
        let detections = vec![detection(ObjectClass::Car, 0.0, 0.0, 0.0)];
        lifecycle.create_tracks(&mut tracks, &detections, &[0], 0.0, &mut report)?;
        lifecycle.apply_association(&mut tracks, &detections, &matched(0, 0), 0.1, &mut report)?;
        lifecycle.apply_association(&mut tracks, &detections, &matched(0, 0), 0.2, &mut report)?;
        assert!(tracks[0].is_confirmed());

        for (cycle, time) in [0.3, 0.4].into_iter().enumerate() {
            lifecycle.apply_association(&mut tracks, &detections, &missed(0), time, &mut report)?;
            assert!(tracks[0].is_confirmed(), "stale after {} misses", cycle + 1);
        }
        lifecycle.apply_association(&mut tracks, &detections, &missed(0), 0.5, &mut report)?;
        assert!(tracks[0].is_stale());

        // stale is terminal
        lifecycle.apply_association(&mut tracks, &detections, &matched(0, 0), 0.6, &mut report)?;
        assert!(tracks[0].is_stale());
        Ok(())
    }

    #[test]
    fn creation_thresholds() -> Result<()> {
        let mut lifecycle = LifecycleManager::new(config());
        let mut report = LifecycleReport::default();
        let mut tracks = vec![];

        let weak = Detection::new(
            None,
            ObjectClass::Car,
            Pose::new(50.0, 0.0, 0.0, 0.0),
            Shape::new(4.5, 1.9, 1.6),
            0.1,
        );
        let detections = vec![
            detection(ObjectClass::Car, 0.0, 0.0, 0.0),
            // overlaps the first one
            detection(ObjectClass::Car, 0.3, 0.0, 0.0),
            weak,
            // overlapping but incompatible
            detection(ObjectClass::Pedestrian, 0.0, 0.0, 0.0),
        ];

        lifecycle.create_tracks(&mut tracks, &detections, &[0, 1, 2, 3], 0.0, &mut report)?;
        assert_eq!(report.created, vec![TrackId(1), TrackId(2)]);
        assert_eq!(tracks[1].class(), ObjectClass::Pedestrian);
        assert_eq!(lifecycle.next_id(), TrackId(3));
        Ok(())
    }

    #[test]
    fn duplicates_keep_the_stronger_track() -> Result<()> {
        let lifecycle = LifecycleManager::new(config());
        let mut report = LifecycleReport::default();

        let mut tracks = [(1, 0.0), (2, 0.2), (3, 20.0)]
            .into_iter()
            .map(|(id, x)| {
                let detection = detection(ObjectClass::Car, x, 0.0, 0.0);
                let model = motion_model::create(
                    &detection,
                    &ClassParams::for_class(ObjectClass::Car),
                )?;
                Ok(Track::new(TrackId(id), &detection, model, 0.0))
            })
            .collect::<Result<Vec<_>>>()?;

        // the younger track has more evidence
        tracks[1].update(&detection(ObjectClass::Car, 0.2, 0.0, 0.0), 0.1)?;

        lifecycle.suppress_duplicates(&mut tracks, &mut report);
        assert_eq!(report.merged, vec![TrackId(1)]);
        assert!(tracks[0].is_stale());
        assert!(!tracks[1].is_stale());
        assert!(!tracks[2].is_stale());
        Ok(())
    }

    #[test]
    fn equal_duplicates_keep_the_lower_id() -> Result<()> {
        let lifecycle = LifecycleManager::new(config());
        let mut report = LifecycleReport::default();
        let detection = detection(ObjectClass::Car, 0.0, 0.0, 0.0);
        let params = ClassParams::for_class(ObjectClass::Car);
        let mut tracks = vec![
            Track::new(TrackId(4), &detection, motion_model::create(&detection, &params)?, 0.0),
            Track::new(TrackId(9), &detection, motion_model::create(&detection, &params)?, 0.0),
        ];

        lifecycle.suppress_duplicates(&mut tracks, &mut report);
        assert_eq!(report.merged, vec![TrackId(9)]);
        Ok(())
    }

    #[test]
    fn diagonal_neighbours_are_kept() -> Result<()> {
        // their axis-aligned extents overlap by about 0.31
        let mut lifecycle = LifecycleManager::new(TrackerConfig {
            duplicate_iou_threshold: 0.25,
            creation_overlap_threshold: 0.25,
            ..config()
        });
        let mut report = LifecycleReport::default();
        let yaw = std::f64::consts::FRAC_PI_4;
        let detections = vec![
            detection(ObjectClass::Car, 0.0, 0.0, yaw),
            // the next lane over, 2.0 across the heading
            detection(ObjectClass::Car, -2.0 * yaw.sin(), 2.0 * yaw.cos(), yaw),
        ];

        let mut tracks = vec![];
        lifecycle.create_tracks(&mut tracks, &detections, &[0, 1], 0.0, &mut report)?;
        assert_eq!(report.created, vec![TrackId(1), TrackId(2)]);

        lifecycle.suppress_duplicates(&mut tracks, &mut report);
        assert!(report.merged.is_empty());
        assert!(tracks.iter().all(|track| !track.is_stale()));
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_association() {
        let lifecycle = LifecycleManager::new(config());
        let mut report = LifecycleReport::default();
        let result =
            lifecycle.apply_association(&mut [], &[], &matched(0, 0), 0.0, &mut report);
        assert!(matches!(result, Err(TrackerError::Invariant(_))));
    }

    #[test]
    fn existence_expiry() -> Result<()> {
        let mut config = config();
        config.classes.with(
            ObjectClass::Car,
            ClassParams {
                min_existence_probability: 0.1,
                ..ClassParams::for_class(ObjectClass::Car)
            },
        );
        let mut lifecycle = LifecycleManager::new(config);
        let mut report = LifecycleReport::default();
        let mut tracks = vec![];
        let detections = vec![detection(ObjectClass::Car, 0.0, 0.0, 0.0)];
        lifecycle.create_tracks(&mut tracks, &detections, &[0], 0.0, &mut report)?;

        lifecycle.expire_unlikely(&mut tracks);
        assert!(!tracks[0].is_stale());

        tracks[0].predict_to(20.0);
        lifecycle.expire_unlikely(&mut tracks);
        assert!(tracks[0].is_stale());
        Ok(())
    }

    #[test]
    fn tentative_publication() -> Result<()> {
        let config = TrackerConfig {
            publish_tentative: true,
            tentative_min_existence: 0.3,
            ..config()
        };
        let mut lifecycle = LifecycleManager::new(config);
        let mut report = LifecycleReport::default();
        let mut tracks = vec![];
        let detections = vec![detection(ObjectClass::Car, 0.0, 0.0, 0.0)];
        lifecycle.create_tracks(&mut tracks, &detections, &[0], 0.0, &mut report)?;

        // existence starts at 0.5 * 0.9
        assert!(!lifecycle.is_published(&tracks[0]));
        assert!(lifecycle.is_surfaced_tentative(&tracks[0]));

        tracks[0].predict_to(1.0);
        assert!(!lifecycle.is_surfaced_tentative(&tracks[0]));
        Ok(())
    }
}
