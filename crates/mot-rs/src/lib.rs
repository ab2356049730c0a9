#[macro_use]
extern crate lazy_static;

mod config;
mod detection;
mod diagnostics;
mod engine;
mod error;
mod existence;
mod geometry;
mod object_class;
mod track;

pub mod gating;
pub mod iou_matching;
pub mod kalman_filter;
pub mod lifecycle;
pub mod linear_assignment;
pub mod motion_model;
pub mod node;

pub use config::{
    ClassParams, ClassTable, TrackerConfig, MAX_PUBLISH_RATE_HZ, MIN_PUBLISH_RATE_HZ,
};
pub use detection::Detection;
pub use diagnostics::{DelayStatus, Diagnostics};
pub use engine::{MeasurementBatch, MeasurementReport, PublishedObjects, TrackingEngine};
pub use error::{DetectionDefect, TrackerError};
pub use existence::ExistenceEstimator;
pub use gating::{CostEvaluator, CostFunction, CostMatrix, MahalanobisCost};
pub use geometry::{footprint_tlbr, is_finite_transform, planar_transform, wrap_angle};
pub use geometry::{Pose, Shape, Velocity};
pub use lifecycle::{LifecycleManager, LifecycleReport};
pub use linear_assignment::{AssociationResult, Match};
pub use motion_model::{ModelKind, MotionModel, ObjectState};
pub use node::{Clock, ObjectSink, SubmitError, SystemClock, TrackerNode};
pub use object_class::ObjectClass;
pub use track::{Track, TrackId, TrackStatus, TrackedObject};
