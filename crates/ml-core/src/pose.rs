use std::{convert::TryFrom, path::Path};

use anyhow::Result;
use image::{RgbImage, imageops::FilterType};
use tch::{self, Device, Kind, Tensor};

use crate::{
    detector::{InferenceError, PoseEstimator},
    types::{COCO_KEYPOINTS, Keypoint, KeypointSet},
};

/// Values per prediction column: box (cx, cy, w, h), score, then x/y/conf per joint.
const POSE_CHANNELS: usize = 5 + COCO_KEYPOINTS * 3;

/// TorchScript-backed YOLO-style pose estimator.
pub struct TorchPoseEstimator {
    module: tch::CModule,
    device: Device,
    input_size: (u32, u32),
    confidence_threshold: f32,
    max_people: usize,
}

impl TorchPoseEstimator {
    /// Load a TorchScript module exported with a `[1, 56, N]` pose head.
    pub fn new<P: AsRef<Path>>(model_path: P, device: Device, input_size: (u32, u32)) -> Result<Self> {
        let module = tch::CModule::load_on_device(model_path, device)?;
        Ok(Self {
            module,
            device,
            input_size,
            confidence_threshold: 0.25,
            max_people: 16,
        })
    }

    /// Override the confidence threshold used for filtering people.
    pub fn with_confidence_threshold(mut self, confidence: f32) -> Self {
        self.confidence_threshold = confidence;
        self
    }

    fn to_tensor(&self, frame: &RgbImage) -> Tensor {
        let (in_w, in_h) = self.input_size;
        let resized;
        let pixels = if frame.dimensions() == (in_w, in_h) {
            frame
        } else {
            resized = image::imageops::resize(frame, in_w, in_h, FilterType::Triangle);
            &resized
        };
        Tensor::from_slice(pixels.as_raw())
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, in_h as i64, in_w as i64, 3])
            .permute([0, 3, 1, 2])
            / 255.0
    }

    fn model_error(err: impl Into<anyhow::Error>) -> InferenceError {
        InferenceError::Model {
            detector: "pose",
            source: err.into(),
        }
    }
}

impl PoseEstimator for TorchPoseEstimator {
    fn name(&self) -> &'static str {
        "pose"
    }

    fn estimate(&mut self, frame: &RgbImage) -> Result<Vec<KeypointSet>, InferenceError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(InferenceError::InvalidInput("empty frame".into()));
        }
        let input = tch::no_grad(|| self.to_tensor(frame));
        let output = tch::no_grad(|| self.module.forward_ts(&[input])).map_err(Self::model_error)?;

        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(InferenceError::InvalidOutput(format!(
                "unexpected pose output shape: {shape:?}"
            )));
        }
        if (shape[1] as usize) < POSE_CHANNELS {
            return Err(InferenceError::InvalidOutput(format!(
                "pose output needs {POSE_CHANNELS} channels, got {}",
                shape[1]
            )));
        }

        let preds = output
            .to_device(Device::Cpu)
            .squeeze_dim(0)
            .permute([1, 0])
            .contiguous();
        let rows: Vec<Vec<f32>> = Vec::<Vec<f32>>::try_from(&preds).map_err(Self::model_error)?;

        let scale_x = frame.width() as f32 / self.input_size.0 as f32;
        let scale_y = frame.height() as f32 / self.input_size.1 as f32;

        let mut people: Vec<KeypointSet> = rows
            .iter()
            .filter(|row| row.len() >= POSE_CHANNELS && row[4] >= self.confidence_threshold)
            .map(|row| {
                let points = row[5..POSE_CHANNELS]
                    .chunks_exact(3)
                    .map(|kp| Keypoint::new(kp[0] * scale_x, kp[1] * scale_y, kp[2]))
                    .collect();
                KeypointSet::new(points, row[4])
            })
            .collect();

        people.sort_by(|a, b| b.score.total_cmp(&a.score));
        people.truncate(self.max_people);
        Ok(people)
    }
}
