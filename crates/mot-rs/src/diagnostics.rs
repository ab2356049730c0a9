use serde::Serialize;
use std::time::Duration;

/// Health of the measurement input, judged by the time since the last processed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayStatus {
    Ok,
    Warn,
    Error,
}

impl DelayStatus {
    /// Classify a delay (s) against the warning and error thresholds.
    ///
    /// No measurement yet is a warning.
    pub fn from_delay(delay: Option<f64>, warn_delay: f64, error_delay: f64) -> DelayStatus {
        match delay {
            None => DelayStatus::Warn,
            Some(delay) if delay >= error_delay => DelayStatus::Error,
            Some(delay) if delay >= warn_delay => DelayStatus::Warn,
            Some(_) => DelayStatus::Ok,
        }
    }
}

/// Snapshot of the engine health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub tentative_tracks: usize,
    pub confirmed_tracks: usize,
    /// Timestamp of the last processed measurement batch.
    pub last_measurement_time: Option<f64>,
    /// Seconds between the last processed batch and the time the snapshot was requested for.
    pub time_since_measurement: Option<f64>,
    pub delay_status: DelayStatus,
    pub last_measurement_duration: Option<Duration>,
    pub last_publish_duration: Option<Duration>,
    pub measurement_cycles: u64,
    pub publish_ticks: u64,
    /// Detections dropped for degenerate geometry.
    pub dropped_detections: u64,
    /// Batches rejected for a missing transform, bad timestamp or out-of-order arrival.
    pub rejected_batches: u64,
    /// Cycles where part of the association was solved greedily.
    pub degraded_cycles: u64,
    /// Cycles aborted by an invariant violation.
    pub faults: u64,
}

/// Counters updated by the engine entry points, kept apart from the track lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct DiagnosticsRecorder {
    tentative_tracks: usize,
    confirmed_tracks: usize,
    last_measurement_time: Option<f64>,
    last_measurement_duration: Option<Duration>,
    last_publish_duration: Option<Duration>,
    measurement_cycles: u64,
    publish_ticks: u64,
    dropped_detections: u64,
    rejected_batches: u64,
    degraded_cycles: u64,
    faults: u64,
}

impl DiagnosticsRecorder {
    pub(crate) fn record_cycle(
        &mut self,
        timestamp: f64,
        duration: Duration,
        degraded: bool,
        (tentative, confirmed): (usize, usize),
    ) {
        self.last_measurement_time = Some(timestamp);
        self.last_measurement_duration = Some(duration);
        self.measurement_cycles += 1;
        self.degraded_cycles += u64::from(degraded);
        self.tentative_tracks = tentative;
        self.confirmed_tracks = confirmed;
    }

    pub(crate) fn record_dropped(&mut self, dropped: usize) {
        self.dropped_detections += dropped as u64;
    }

    pub(crate) fn record_rejection(&mut self) {
        self.rejected_batches += 1;
    }

    pub(crate) fn record_fault(&mut self) {
        self.faults += 1;
    }

    pub(crate) fn record_tick(&mut self, duration: Duration, (tentative, confirmed): (usize, usize)) {
        self.last_publish_duration = Some(duration);
        self.publish_ticks += 1;
        self.tentative_tracks = tentative;
        self.confirmed_tracks = confirmed;
    }

    pub(crate) fn snapshot(&self, now: f64, warn_delay: f64, error_delay: f64) -> Diagnostics {
        let time_since_measurement = self.last_measurement_time.map(|t| now - t);
        Diagnostics {
            tentative_tracks: self.tentative_tracks,
            confirmed_tracks: self.confirmed_tracks,
            last_measurement_time: self.last_measurement_time,
            time_since_measurement,
            delay_status: DelayStatus::from_delay(time_since_measurement, warn_delay, error_delay),
            last_measurement_duration: self.last_measurement_duration,
            last_publish_duration: self.last_publish_duration,
            measurement_cycles: self.measurement_cycles,
            publish_ticks: self.publish_ticks,
            dropped_detections: self.dropped_detections,
            rejected_batches: self.rejected_batches,
            degraded_cycles: self.degraded_cycles,
            faults: self.faults,
        }
    }
}
