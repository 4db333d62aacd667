//! Inference output shared between detectors, the pipeline, and plugins.
//!
//! Coordinates are always expressed in pixels of the frame handed to the
//! detector, so plugins can draw directly onto the annotated frame.

use serde::Serialize;

/// Number of joints in a COCO-17 pose.
pub const COCO_KEYPOINTS: usize = 17;

/// COCO-17 joint indices.
pub mod joint {
    pub const NOSE: usize = 0;
    pub const LEFT_EYE: usize = 1;
    pub const RIGHT_EYE: usize = 2;
    pub const LEFT_EAR: usize = 3;
    pub const RIGHT_EAR: usize = 4;
    pub const LEFT_SHOULDER: usize = 5;
    pub const RIGHT_SHOULDER: usize = 6;
    pub const LEFT_ELBOW: usize = 7;
    pub const RIGHT_ELBOW: usize = 8;
    pub const LEFT_WRIST: usize = 9;
    pub const RIGHT_WRIST: usize = 10;
    pub const LEFT_HIP: usize = 11;
    pub const RIGHT_HIP: usize = 12;
    pub const LEFT_KNEE: usize = 13;
    pub const RIGHT_KNEE: usize = 14;
    pub const LEFT_ANKLE: usize = 15;
    pub const RIGHT_ANKLE: usize = 16;
}

/// Bones drawn between COCO-17 joints.
pub const COCO_SKELETON: [(usize, usize); 16] = [
    (joint::LEFT_ANKLE, joint::LEFT_KNEE),
    (joint::LEFT_KNEE, joint::LEFT_HIP),
    (joint::RIGHT_ANKLE, joint::RIGHT_KNEE),
    (joint::RIGHT_KNEE, joint::RIGHT_HIP),
    (joint::LEFT_HIP, joint::RIGHT_HIP),
    (joint::LEFT_SHOULDER, joint::LEFT_HIP),
    (joint::RIGHT_SHOULDER, joint::RIGHT_HIP),
    (joint::LEFT_SHOULDER, joint::RIGHT_SHOULDER),
    (joint::LEFT_SHOULDER, joint::LEFT_ELBOW),
    (joint::RIGHT_SHOULDER, joint::RIGHT_ELBOW),
    (joint::LEFT_ELBOW, joint::LEFT_WRIST),
    (joint::RIGHT_ELBOW, joint::RIGHT_WRIST),
    (joint::LEFT_EYE, joint::RIGHT_EYE),
    (joint::NOSE, joint::LEFT_EYE),
    (joint::NOSE, joint::RIGHT_EYE),
    (joint::LEFT_EAR, joint::LEFT_SHOULDER),
];

/// Number of landmarks per detected hand.
pub const HAND_LANDMARKS: usize = 21;

/// Hand landmark indices (wrist, then four joints per finger from base to tip).
pub mod landmark {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_TIP: usize = 20;
}

/// Connections drawn between hand landmarks.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

/// One estimated body joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}

/// Ordered joints of a single person.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeypointSet {
    pub points: Vec<Keypoint>,
    /// Detection score of the person box the joints belong to.
    pub score: f32,
}

impl KeypointSet {
    pub fn new(points: Vec<Keypoint>, score: f32) -> Self {
        Self { points, score }
    }

    pub fn get(&self, index: usize) -> Option<&Keypoint> {
        self.points.get(index)
    }

    /// Joint `index` when its confidence reaches `min_confidence`.
    pub fn confident(&self, index: usize, min_confidence: f32) -> Option<&Keypoint> {
        self.points
            .get(index)
            .filter(|kp| kp.confidence >= min_confidence)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One estimated point on a hand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Relative depth; smaller is closer to the camera.
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
}

/// Landmarks of a single detected hand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hand {
    pub landmarks: Vec<Landmark>,
    pub handedness: Option<Handedness>,
    pub score: f32,
}

impl Hand {
    pub fn landmark(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }

    /// Whether the hand carries the full 21-point landmark layout.
    pub fn is_complete(&self) -> bool {
        self.landmarks.len() >= HAND_LANDMARKS
    }
}

/// All hands found in one frame; never constructed empty by the adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandLandmarks {
    pub hands: Vec<Hand>,
}

impl HandLandmarks {
    pub fn len(&self) -> usize {
        self.hands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hand> {
        self.hands.iter()
    }
}
