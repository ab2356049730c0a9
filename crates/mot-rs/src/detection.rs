use crate::{DetectionDefect, ObjectClass, Pose, Shape};
use nalgebra::Isometry3;
use uuid::Uuid;

/// Detection represents one object observed by the sensor-fusion front end in a single batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Unique detection identifier
    id: Uuid,
    /// Semantic class reported by the detector.
    class: ObjectClass,
    /// Pose of the object.
    pose: Pose,
    /// Bounding cuboid extent of the object.
    shape: Shape,
    /// Detection confidence score.
    confidence: f64,
}

impl Detection {
    /// Returns a new Detection
    ///
    /// # Parameters
    ///
    /// * `id`: An optional unique identifier. A random one is generated if not given.
    /// * `class`: The detected object class.
    /// * `pose`: Pose of the object in the sensor frame.
    /// * `shape`: Extent of the object.
    /// * `confidence`: Detection confidence score.
    pub fn new(
        id: Option<Uuid>,
        class: ObjectClass,
        pose: Pose,
        shape: Shape,
        confidence: f64,
    ) -> Detection {
        Detection {
            id: id.unwrap_or_else(Uuid::new_v4),
            class,
            pose,
            shape,
            confidence,
        }
    }

    /// Returns the unique id of the detection
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    /// Returns the class of the detection
    pub fn class(&self) -> ObjectClass {
        self.class
    }

    /// Returns the pose of the detection
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Returns the shape of the detection
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the confidence of the detection
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Checks that the detection geometry can be fused into a track.
    pub fn validate(&self) -> Result<(), DetectionDefect> {
        if !self.pose.is_finite() {
            Err(DetectionDefect::NonFinitePose)
        } else if !self.shape.is_valid() {
            Err(DetectionDefect::DegenerateExtent)
        } else if !self.confidence.is_finite() {
            Err(DetectionDefect::NonFiniteConfidence)
        } else {
            Ok(())
        }
    }

    /// Returns a copy of the detection with its pose expressed in the target frame of `transform`.
    pub fn transformed(&self, transform: &Isometry3<f64>) -> Detection {
        Detection {
            pose: self.pose.transformed(transform),
            ..self.clone()
        }
    }
}
