use crate::{MeasurementBatch, PublishedObjects, TrackingEngine};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, error, info};

/// Receives every published snapshot. Transport-specific serialization lives behind this trait.
pub trait ObjectSink: Send + Sync {
    fn publish(&self, objects: &PublishedObjects);
}

/// Source of publish tick timestamps, in the same time base as the measurement batches.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock time in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The measurement worker still has a batch queued. The batch is handed back.
    #[error("measurement worker is busy")]
    Busy(MeasurementBatch),
    #[error("tracker node is stopped")]
    Stopped,
}

/// Runs a [`TrackingEngine`] on two threads: a measurement worker fed by a
/// single-slot queue and a publish worker driven by a fixed-rate timer.
pub struct TrackerNode {
    engine: Arc<TrackingEngine>,
    measurements: Option<Sender<MeasurementBatch>>,
    stop: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl TrackerNode {
    /// Returns a running TrackerNode
    ///
    /// # Parameters
    ///
    /// * `engine`: The engine, possibly shared with other callers.
    /// * `sink`: Receives the snapshot of every publish tick.
    /// * `clock`: Timestamps the publish ticks.
    pub fn spawn(
        engine: Arc<TrackingEngine>,
        sink: Arc<dyn ObjectSink>,
        clock: Arc<dyn Clock>,
    ) -> TrackerNode {
        let (measurement_tx, measurement_rx) = bounded::<MeasurementBatch>(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let measurement_worker = {
            let engine = engine.clone();
            thread::spawn(move || measurement_loop(&engine, measurement_rx))
        };

        let publish_worker = {
            let engine = engine.clone();
            let period = engine.config().publish_period();
            thread::spawn(move || {
                publish_loop(&engine, tick(period), stop_rx, sink.as_ref(), clock.as_ref())
            })
        };

        info!(
            publish_rate_hz = engine.config().publish_rate_hz,
            "tracker node started"
        );

        TrackerNode {
            engine,
            measurements: Some(measurement_tx),
            stop: Some(stop_tx),
            workers: vec![measurement_worker, publish_worker],
        }
    }

    /// Return the engine
    pub fn engine(&self) -> &Arc<TrackingEngine> {
        &self.engine
    }

    /// Queue a batch, waiting for the measurement worker to accept it.
    pub fn submit(&self, batch: MeasurementBatch) -> Result<(), SubmitError> {
        self.measurements
            .as_ref()
            .ok_or(SubmitError::Stopped)?
            .send(batch)
            .map_err(|_| SubmitError::Stopped)
    }

    /// Queue a batch if the measurement worker can accept it now.
    pub fn try_submit(&self, batch: MeasurementBatch) -> Result<(), SubmitError> {
        let sender = self.measurements.as_ref().ok_or(SubmitError::Stopped)?;
        sender.try_send(batch).map_err(|e| match e {
            TrySendError::Full(batch) => SubmitError::Busy(batch),
            TrySendError::Disconnected(_) => SubmitError::Stopped,
        })
    }

    /// Stop both workers once the queued batch has been processed.
    pub fn stop(&mut self) {
        self.measurements.take();
        self.stop.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("tracker node worker panicked");
            }
        }
        info!("tracker node stopped");
    }
}

impl Drop for TrackerNode {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}

fn measurement_loop(engine: &TrackingEngine, batches: Receiver<MeasurementBatch>) {
    for batch in batches.iter() {
        match engine.on_measurement(batch) {
            Ok(report) => debug!(
                timestamp = report.timestamp,
                matched = report.matched,
                "measurement processed"
            ),
            // rejections are logged by the engine
            Err(err) if err.is_rejection() => {}
            Err(err) => error!(%err, "measurement cycle failed"),
        }
    }
}

fn publish_loop(
    engine: &TrackingEngine,
    ticker: Receiver<std::time::Instant>,
    stop: Receiver<()>,
    sink: &dyn ObjectSink,
    clock: &dyn Clock,
) {
    loop {
        select! {
            recv(ticker) -> _ => match engine.on_publish_tick(clock.now()) {
                Ok(published) => sink.publish(&published),
                Err(err) => error!(%err, "publish tick failed"),
            },
            // the stop sender is only ever dropped
            recv(stop) -> _ => break,
        }
    }
}
