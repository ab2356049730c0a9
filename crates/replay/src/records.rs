use anyhow::{Context, Result};
use indexmap::IndexMap;
use mot_rs::{
    planar_transform, Detection, MeasurementBatch, ObjectClass, Pose, PublishedObjects, Shape,
    TrackStatus, TrackedObject,
};
use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};
use std::io;

/// One detection row of a recorded log.
///
/// Rows sharing a timestamp form one measurement batch. The sensor pose is
/// taken from the first row of a batch; leave it empty to replay a failed
/// transform lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionRecord {
    pub timestamp: f64,
    pub class: ObjectClass,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
    pub sensor_x: Option<f64>,
    pub sensor_y: Option<f64>,
    pub sensor_yaw: Option<f64>,
}

impl DetectionRecord {
    pub fn to_detection(&self) -> Detection {
        Detection::new(
            None,
            self.class,
            Pose::new(self.x, self.y, self.z, self.yaw),
            Shape::new(self.length, self.width, self.height),
            self.confidence,
        )
    }

    pub fn sensor_to_world(&self) -> Option<Isometry3<f64>> {
        Some(planar_transform(
            self.sensor_x?,
            self.sensor_y?,
            self.sensor_yaw?,
        ))
    }
}

/// Read a detection log and group its rows into batches, in order of first appearance.
pub fn read_batches<R: io::Read>(reader: R) -> Result<Vec<MeasurementBatch>> {
    let mut batches = IndexMap::<u64, Vec<DetectionRecord>>::new();

    for (line, record) in csv::Reader::from_reader(reader)
        .deserialize::<DetectionRecord>()
        .enumerate()
    {
        let record = record.with_context(|| format!("invalid detection record {}", line + 1))?;
        batches
            .entry(record.timestamp.to_bits())
            .or_default()
            .push(record);
    }

    Ok(batches
        .into_values()
        .filter_map(|records| {
            let first = records.first()?;
            Some(MeasurementBatch::new(
                first.timestamp,
                records.iter().map(DetectionRecord::to_detection).collect(),
                first.sensor_to_world(),
            ))
        })
        .collect())
}

/// One published track at one publish tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub publish_time: f64,
    pub track_id: u64,
    pub class: ObjectClass,
    pub status: TrackStatus,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub vx: f64,
    pub vy: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

impl TrackRecord {
    fn new(publish_time: f64, object: &TrackedObject) -> TrackRecord {
        TrackRecord {
            publish_time,
            track_id: object.track_id.0,
            class: object.class,
            status: object.status,
            x: object.pose.x(),
            y: object.pose.y(),
            z: object.pose.z(),
            yaw: object.pose.yaw(),
            vx: object.velocity.vx,
            vy: object.velocity.vy,
            length: object.shape.length(),
            width: object.shape.width(),
            height: object.shape.height(),
            confidence: object.confidence,
        }
    }

    /// Rows of every object of a snapshot, confirmed first.
    pub fn from_published(published: &PublishedObjects) -> Vec<TrackRecord> {
        published
            .objects
            .iter()
            .chain(&published.tentative)
            .map(|object| TrackRecord::new(published.timestamp, object))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::records::*;
    use anyhow::Result;

    const LOG: &str = "\
timestamp,class,x,y,z,yaw,length,width,height,confidence,sensor_x,sensor_y,sensor_yaw
0.0,car,10.0,0.0,0.0,0.0,4.5,1.9,1.6,0.9,1.0,2.0,0.0
0.0,pedestrian,3.0,1.0,0.0,0.0,0.6,0.6,1.7,0.8,1.0,2.0,0.0
0.1,car,10.1,0.0,0.0,0.0,4.5,1.9,1.6,0.9,,,
";

    #[test]
    fn groups_rows_into_batches() -> Result<()> {
        let batches = read_batches(LOG.as_bytes())?;
        assert_eq!(batches.len(), 2);

        assert_eq!(batches[0].timestamp, 0.0);
        assert_eq!(batches[0].detections.len(), 2);
        assert_eq!(batches[0].detections[1].class(), ObjectClass::Pedestrian);
        let transform = batches[0].sensor_to_world.expect("transform");
        assert_eq!(transform.translation.vector.x, 1.0);

        assert_eq!(batches[1].detections.len(), 1);
        assert!(batches[1].sensor_to_world.is_none());
        Ok(())
    }

    #[test]
    fn rejects_malformed_rows() {
        let log = "timestamp,class\n0.0,spaceship\n";
        assert!(read_batches(log.as_bytes()).is_err());
    }
}
