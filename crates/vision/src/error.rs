use std::any::Any;

use thiserror::Error;
use video_ingest::CaptureError;

/// Failures the pipeline distinguishes when deciding how to recover.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("video source unavailable: {0}")]
    SourceUnavailable(#[from] CaptureError),
    #[error("{detector} inference failed: {reason}")]
    InferenceFailure {
        detector: &'static str,
        reason: String,
    },
    #[error("plugin `{plugin}` failed: {reason}")]
    PluginFailure { plugin: String, reason: String },
    #[error("Plugin not found: {0}")]
    UnknownPlugin(String),
    #[error("no frame has been published yet")]
    NotReady,
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("panicked: {text}")
    } else {
        "panicked with a non-string payload".to_string()
    }
}
