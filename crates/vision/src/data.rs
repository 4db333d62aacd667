//! Values handed from the detection loop to HTTP readers.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::encoding;

/// RGB triple used for alert colours.
pub type AlertColor = [u8; 3];

/// One validated plugin message for one frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PluginAlert {
    #[serde(skip)]
    pub plugin: &'static str,
    pub message: String,
    pub color: AlertColor,
}

/// Immutable per-cycle status published alongside the frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SystemStatusSnapshot {
    pub frame_count: u64,
    pub person_detected: bool,
    pub hands_detected: bool,
    pub device: &'static str,
    pub resolution: String,
    #[serde(rename = "plugins")]
    pub enabled_plugin_ids: Vec<String>,
    pub plugins_loaded: usize,
    #[serde(rename = "total_plugins")]
    pub total_plugin_count: usize,
    pub fps: f32,
    pub alert_count: usize,
    pub model_loaded: bool,
}

/// Everything one completed cycle produced. Never mutated after publish.
#[derive(Debug)]
pub struct FrameCycleOutput {
    frame: RgbImage,
    alerts: Vec<PluginAlert>,
    status: SystemStatusSnapshot,
    jpeg: OnceLock<Arc<[u8]>>,
}

impl FrameCycleOutput {
    pub fn new(frame: RgbImage, alerts: Vec<PluginAlert>, status: SystemStatusSnapshot) -> Self {
        Self {
            frame,
            alerts,
            status,
            jpeg: OnceLock::new(),
        }
    }

    pub fn frame(&self) -> &RgbImage {
        &self.frame
    }

    pub fn alerts(&self) -> &[PluginAlert] {
        &self.alerts
    }

    pub fn status(&self) -> &SystemStatusSnapshot {
        &self.status
    }

    pub fn messages(&self) -> Vec<&str> {
        self.alerts.iter().map(|alert| alert.message.as_str()).collect()
    }

    pub fn colors(&self) -> Vec<AlertColor> {
        self.alerts.iter().map(|alert| alert.color).collect()
    }

    /// JPEG bytes of the annotated frame, encoded on first request.
    ///
    /// Concurrent first callers may each encode; only one result is kept.
    pub fn jpeg(&self, quality: u8) -> Result<Arc<[u8]>> {
        if let Some(bytes) = self.jpeg.get() {
            return Ok(bytes.clone());
        }
        let bytes: Arc<[u8]> = encoding::encode_jpeg(&self.frame, quality)?.into();
        Ok(self.jpeg.get_or_init(|| bytes).clone())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_and_colors_stay_paired() {
        let output = fixtures::output(3, &["a", "b"]);
        assert_eq!(output.messages(), vec!["a", "b"]);
        assert_eq!(output.colors().len(), 2);
    }

    #[test]
    fn jpeg_is_encoded_once() {
        let output = fixtures::output(1, &[]);
        let first = output.jpeg(80).unwrap();
        let second = output.jpeg(10).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&first[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn status_serializes_with_wire_names() {
        let json = serde_json::to_value(fixtures::status(9)).unwrap();
        assert_eq!(json["frame_count"], 9);
        assert!(json.get("plugins").is_some());
        assert!(json.get("total_plugins").is_some());
    }
}
