use image::RgbImage;
use serde::Serialize;
use thiserror::Error;

use crate::types::{Hand, KeypointSet};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("{detector} model failed: {source}")]
    Model {
        detector: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid detector input: {0}")]
    InvalidInput(String),
    #[error("malformed detector output: {0}")]
    InvalidOutput(String),
}

/// Body-pose estimator invoked once per frame.
pub trait PoseEstimator: Send {
    fn name(&self) -> &'static str;

    /// Every person found in `frame`, highest detection score first.
    fn estimate(&mut self, frame: &RgbImage) -> Result<Vec<KeypointSet>, InferenceError>;

    /// Whether a model backs this estimator.
    fn is_loaded(&self) -> bool {
        true
    }

    /// Free model resources. Called once when the pipeline stops.
    fn close(&mut self) {}
}

/// Hand-landmark detector invoked once per frame.
pub trait HandLandmarker: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Hand>, InferenceError>;

    fn is_loaded(&self) -> bool {
        true
    }

    fn close(&mut self) {}
}

/// Stand-in used when no model was configured; it never detects anything.
#[derive(Debug, Clone, Copy)]
pub struct DisabledDetector {
    name: &'static str,
}

impl DisabledDetector {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl PoseEstimator for DisabledDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn estimate(&mut self, _frame: &RgbImage) -> Result<Vec<KeypointSet>, InferenceError> {
        Ok(Vec::new())
    }

    fn is_loaded(&self) -> bool {
        false
    }
}

impl HandLandmarker for DisabledDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Hand>, InferenceError> {
        Ok(Vec::new())
    }

    fn is_loaded(&self) -> bool {
        false
    }
}

/// Where inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComputeDevice {
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "GPU")]
    Gpu,
}

impl ComputeDevice {
    /// Pick the GPU when one is usable and the caller did not force the CPU.
    pub fn detect(force_cpu: bool) -> Self {
        if force_cpu {
            return ComputeDevice::Cpu;
        }
        #[cfg(feature = "with-tch")]
        if tch::Cuda::is_available() {
            return ComputeDevice::Gpu;
        }
        ComputeDevice::Cpu
    }

    pub fn label(self) -> &'static str {
        match self {
            ComputeDevice::Cpu => "CPU",
            ComputeDevice::Gpu => "GPU",
        }
    }

    #[cfg(feature = "with-tch")]
    pub fn to_tch(self) -> tch::Device {
        match self {
            ComputeDevice::Cpu => tch::Device::Cpu,
            ComputeDevice::Gpu => tch::Device::Cuda(0),
        }
    }
}
