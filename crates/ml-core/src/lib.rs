//! Pose and hand-landmark inference for the posewatch pipeline.
//!
//! Detectors are opaque to the rest of the workspace: the pipeline only sees
//! the [`PoseEstimator`] and [`HandLandmarker`] traits. TorchScript backends
//! are compiled in with the `with-tch` feature.

pub mod detector;
#[cfg(feature = "with-tch")]
pub mod hands;
#[cfg(feature = "with-tch")]
pub mod pose;
pub mod types;

pub use detector::{ComputeDevice, DisabledDetector, HandLandmarker, InferenceError, PoseEstimator};
pub use types::{
    COCO_KEYPOINTS, COCO_SKELETON, HAND_CONNECTIONS, HAND_LANDMARKS, Hand, HandLandmarks, Handedness,
    Keypoint, KeypointSet, Landmark,
};

#[cfg(feature = "with-tch")]
pub use tch;
