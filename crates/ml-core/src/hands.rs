use std::{convert::TryFrom, path::Path};

use anyhow::Result;
use image::{RgbImage, imageops::FilterType};
use tch::{self, Device, Kind, Tensor};

use crate::{
    detector::{HandLandmarker, InferenceError},
    types::{HAND_LANDMARKS, Hand, Handedness, Landmark},
};

/// Columns per hand: normalised x/y/z per landmark, presence score, handedness.
const HAND_COLUMNS: usize = HAND_LANDMARKS * 3 + 2;

/// TorchScript-backed hand landmark model producing `[hands, 65]` rows.
pub struct TorchHandLandmarker {
    module: tch::CModule,
    device: Device,
    input_size: (u32, u32),
    max_hands: usize,
    min_presence: f32,
}

impl TorchHandLandmarker {
    pub fn new<P: AsRef<Path>>(model_path: P, device: Device, input_size: (u32, u32)) -> Result<Self> {
        let module = tch::CModule::load_on_device(model_path, device)?;
        Ok(Self {
            module,
            device,
            input_size,
            max_hands: 2,
            min_presence: 0.5,
        })
    }

    fn model_error(err: impl Into<anyhow::Error>) -> InferenceError {
        InferenceError::Model {
            detector: "hands",
            source: err.into(),
        }
    }
}

impl HandLandmarker for TorchHandLandmarker {
    fn name(&self) -> &'static str {
        "hands"
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Hand>, InferenceError> {
        let (in_w, in_h) = self.input_size;
        let resized = image::imageops::resize(frame, in_w, in_h, FilterType::Triangle);
        let input = Tensor::from_slice(resized.as_raw())
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, in_h as i64, in_w as i64, 3])
            .permute([0, 3, 1, 2])
            / 255.0;

        let output = tch::no_grad(|| self.module.forward_ts(&[input])).map_err(Self::model_error)?;
        let shape = output.size();
        if shape.len() != 2 || (shape[1] as usize) < HAND_COLUMNS {
            return Err(InferenceError::InvalidOutput(format!(
                "unexpected hand output shape: {shape:?}"
            )));
        }

        let rows: Vec<Vec<f32>> =
            Vec::<Vec<f32>>::try_from(&output.to_device(Device::Cpu).contiguous())
                .map_err(Self::model_error)?;

        let width = frame.width() as f32;
        let height = frame.height() as f32;
        let hands = rows
            .iter()
            .filter(|row| row[HAND_LANDMARKS * 3] >= self.min_presence)
            .take(self.max_hands)
            .map(|row| Hand {
                landmarks: row[..HAND_LANDMARKS * 3]
                    .chunks_exact(3)
                    .map(|p| Landmark::new(p[0] * width, p[1] * height, p[2]))
                    .collect(),
                handedness: Some(if row[HAND_LANDMARKS * 3 + 1] >= 0.5 {
                    Handedness::Right
                } else {
                    Handedness::Left
                }),
                score: row[HAND_LANDMARKS * 3],
            })
            .collect();
        Ok(hands)
    }
}
