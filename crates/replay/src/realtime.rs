use mot_rs::{Clock, ObjectSink, PublishedObjects};
use parking_lot::Mutex;
use std::time::Instant;

/// Maps wall-clock time onto the time base of a recorded log.
#[derive(Debug, Clone, Copy)]
pub struct ReplayClock {
    origin: f64,
    started: Instant,
}

impl ReplayClock {
    /// Returns a new ReplayClock
    ///
    /// # Parameters
    ///
    /// * `origin`: The log timestamp that corresponds to now.
    pub fn new(origin: f64) -> ReplayClock {
        ReplayClock {
            origin,
            started: Instant::now(),
        }
    }
}

impl Clock for ReplayClock {
    fn now(&self) -> f64 {
        self.origin + self.started.elapsed().as_secs_f64()
    }
}

/// Keeps every published snapshot until the replay finishes.
#[derive(Debug, Default)]
pub struct CollectingSink {
    published: Mutex<Vec<PublishedObjects>>,
}

impl CollectingSink {
    pub fn take(&self) -> Vec<PublishedObjects> {
        std::mem::take(&mut *self.published.lock())
    }
}

impl ObjectSink for CollectingSink {
    fn publish(&self, objects: &PublishedObjects) {
        self.published.lock().push(objects.clone());
    }
}

#[cfg(test)]
mod tests {
    use crate::realtime::*;

    #[test]
    fn replay_clock_starts_at_the_origin() {
        let clock = ReplayClock::new(100.0);
        let now = clock.now();
        assert!(now >= 100.0 && now < 101.0);
    }

    #[test]
    fn collecting_sink() {
        let sink = CollectingSink::default();
        sink.publish(&PublishedObjects {
            timestamp: 1.0,
            objects: vec![],
            tentative: vec![],
        });
        assert_eq!(sink.take().len(), 1);
        assert!(sink.take().is_empty());
    }
}
