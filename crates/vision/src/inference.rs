//! Uniform per-frame wrapper around the pose and hand detectors.
//!
//! Detector errors and panics never leave this module: a failed detector
//! contributes no detections and no overlay for that frame, the other
//! detector's result is kept, and the failure is logged against its name.

use std::panic::{self, AssertUnwindSafe};

use image::RgbImage;
use ml_core::{DisabledDetector, HandLandmarker, HandLandmarks, InferenceError, KeypointSet, PoseEstimator};
use tracing::{info, warn};

use crate::{
    annotation,
    error::{PipelineError, panic_message},
};

/// Joints below this confidence are not drawn.
const DRAW_MIN_CONFIDENCE: f32 = 0.5;

/// Result of one inference call.
#[derive(Debug)]
pub struct InferenceOutput {
    pub annotated: RgbImage,
    /// Primary person only, even when the model found several.
    pub keypoints: Option<KeypointSet>,
    pub hands: Option<HandLandmarks>,
    pub failures: Vec<PipelineError>,
}

pub struct InferenceAdapter {
    pose: Box<dyn PoseEstimator>,
    hands: Box<dyn HandLandmarker>,
    closed: bool,
}

impl InferenceAdapter {
    pub fn new(pose: Box<dyn PoseEstimator>, hands: Box<dyn HandLandmarker>) -> Self {
        Self {
            pose,
            hands,
            closed: false,
        }
    }

    /// Adapter whose detectors never find anything.
    pub fn disabled() -> Self {
        Self::new(
            Box::new(DisabledDetector::new("pose")),
            Box::new(DisabledDetector::new("hands")),
        )
    }

    pub fn model_loaded(&self) -> bool {
        self.pose.is_loaded()
    }

    pub fn infer(&mut self, frame: &RgbImage) -> InferenceOutput {
        let pose_name = self.pose.name();
        let hands_name = self.hands.name();
        let pose = &mut self.pose;
        let people = guarded(pose_name, || pose.estimate(frame));
        let detector = &mut self.hands;
        let hands = guarded(hands_name, || detector.detect(frame));

        let mut annotated = frame.clone();
        let mut failures = Vec::new();

        let keypoints = match people {
            Ok(people) => people.into_iter().find(|person| !person.is_empty()),
            Err(failure) => {
                failures.push(failure);
                None
            }
        };
        let hands = match hands {
            Ok(hands) => (!hands.is_empty()).then_some(HandLandmarks { hands }),
            Err(failure) => {
                failures.push(failure);
                None
            }
        };

        if let Some(person) = &keypoints {
            annotation::draw_skeleton(&mut annotated, person, DRAW_MIN_CONFIDENCE);
        }
        for hand in hands.iter().flat_map(|found| found.iter()) {
            annotation::draw_hand(&mut annotated, hand);
        }
        InferenceOutput {
            annotated,
            keypoints,
            hands,
            failures,
        }
    }

    /// Release detector resources. Later calls are no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pose.close();
        self.hands.close();
        info!("detectors released");
    }
}

fn guarded<T>(
    detector: &'static str,
    call: impl FnOnce() -> Result<T, InferenceError>,
) -> Result<T, PipelineError> {
    let reason = match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(err)) => err.to_string(),
        Err(payload) => panic_message(payload),
    };
    let failure = PipelineError::InferenceFailure { detector, reason };
    warn!(detector, "{failure}");
    metrics::counter!("vision_inference_failures_total", "detector" => detector).increment(1);
    Err(failure)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use ml_core::{Hand, Keypoint, Landmark};

    use super::*;

    struct People(Vec<KeypointSet>);

    impl PoseEstimator for People {
        fn name(&self) -> &'static str {
            "pose"
        }

        fn estimate(&mut self, _frame: &RgbImage) -> Result<Vec<KeypointSet>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl PoseEstimator for Broken {
        fn name(&self) -> &'static str {
            "pose"
        }

        fn estimate(&mut self, _frame: &RgbImage) -> Result<Vec<KeypointSet>, InferenceError> {
            Err(InferenceError::InvalidOutput("tensor rank 2".into()))
        }
    }

    struct PanickingHands;

    impl HandLandmarker for PanickingHands {
        fn name(&self) -> &'static str {
            "hands"
        }

        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Hand>, InferenceError> {
            panic!("detector crashed");
        }
    }

    struct CountingHands(Arc<AtomicUsize>, Vec<Hand>);

    impl HandLandmarker for CountingHands {
        fn name(&self) -> &'static str {
            "hands"
        }

        fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Hand>, InferenceError> {
            Ok(self.1.clone())
        }

        fn close(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn person(x: f32, score: f32) -> KeypointSet {
        KeypointSet::new(vec![Keypoint::new(x, 10.0, 0.9); 17], score)
    }

    fn hand() -> Hand {
        Hand {
            landmarks: vec![Landmark::new(20.0, 20.0, 0.0); 21],
            handedness: None,
            score: 0.8,
        }
    }

    #[test]
    fn keeps_only_the_primary_person() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut adapter = InferenceAdapter::new(
            Box::new(People(vec![person(5.0, 0.9), person(30.0, 0.7)])),
            Box::new(CountingHands(closes, vec![hand()])),
        );
        let frame = RgbImage::new(40, 40);
        let output = adapter.infer(&frame);
        assert_eq!(output.keypoints.unwrap().points[0].x, 5.0);
        assert_eq!(output.hands.unwrap().len(), 1);
        assert!(output.failures.is_empty());
        assert_ne!(output.annotated, frame);
    }

    #[test]
    fn empty_detections_are_absent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut adapter =
            InferenceAdapter::new(Box::new(People(Vec::new())), Box::new(CountingHands(closes, Vec::new())));
        let output = adapter.infer(&RgbImage::new(8, 8));
        assert!(output.keypoints.is_none());
        assert!(output.hands.is_none());
    }

    #[test]
    fn pose_failure_keeps_hand_result() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut adapter =
            InferenceAdapter::new(Box::new(Broken), Box::new(CountingHands(closes, vec![hand()])));
        let frame = RgbImage::from_pixel(40, 40, image::Rgb([7, 7, 7]));
        let output = adapter.infer(&frame);
        assert!(output.keypoints.is_none());
        assert_eq!(output.hands.as_ref().map(HandLandmarks::len), Some(1));
        // Hand overlay only.
        assert_ne!(output.annotated, frame);
        assert!(matches!(
            output.failures.as_slice(),
            [PipelineError::InferenceFailure { detector: "pose", .. }]
        ));
    }

    #[test]
    fn hand_panic_keeps_keypoints() {
        let mut adapter =
            InferenceAdapter::new(Box::new(People(vec![person(5.0, 0.9)])), Box::new(PanickingHands));
        let frame = RgbImage::new(40, 40);
        let output = adapter.infer(&frame);
        assert_eq!(output.keypoints.unwrap().points[0].x, 5.0);
        assert!(output.hands.is_none());
        assert_ne!(output.annotated, frame);
        assert_eq!(output.failures.len(), 1);
        assert!(output.failures[0].to_string().contains("detector crashed"));
    }

    #[test]
    fn both_failures_return_unannotated_copy() {
        let mut adapter = InferenceAdapter::new(Box::new(Broken), Box::new(PanickingHands));
        let frame = RgbImage::from_pixel(40, 40, image::Rgb([7, 7, 7]));
        let output = adapter.infer(&frame);
        assert_eq!(output.annotated, frame);
        assert!(output.keypoints.is_none() && output.hands.is_none());
        assert_eq!(output.failures.len(), 2);
    }

    #[test]
    fn close_runs_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut adapter = InferenceAdapter::new(
            Box::new(People(Vec::new())),
            Box::new(CountingHands(closes.clone(), Vec::new())),
        );
        adapter.close();
        adapter.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_adapter_reports_no_model() {
        let mut adapter = InferenceAdapter::disabled();
        assert!(!adapter.model_loaded());
        let output = adapter.infer(&RgbImage::new(4, 4));
        assert!(output.keypoints.is_none() && output.failures.is_empty());
    }
}
