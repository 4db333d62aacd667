//! Frame acquisition for the posewatch pipeline.
//!
//! Every reader runs on its own thread and hands BGR8 frames over a small
//! bounded channel; [`open_source`] wraps the channel in a pull-based
//! [`FrameSource`] the detection loop can poll.

use std::time::Duration;

use tracing::info;

#[cfg(feature = "opencv")]
mod camera;
mod ffmpeg;
mod source;
mod types;

#[cfg(feature = "opencv")]
pub use camera::spawn_camera_reader;
pub use ffmpeg::{spawn_file_reader, spawn_rtsp_reader, spawn_v4l2_reader};
pub use source::{ChannelSource, FrameReceiver, FrameSource};
pub use types::{CaptureError, Frame, FrameFormat};

/// How long a single read waits before reporting the source as unavailable.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Ingress transport used to source frames.
pub enum SourceKind {
    /// Local V4L devices, addressed by index or `/dev/videoN`.
    Device,
    /// Real-time streaming protocol feeds.
    Rtsp,
    /// Pre-recorded video files; these end instead of reconnecting.
    File,
}

impl SourceKind {
    /// Infer the transport kind from a URI.
    pub fn from_uri(uri: &str) -> Self {
        if uri.starts_with("rtsp://") || uri.starts_with("rtsps://") {
            SourceKind::Rtsp
        } else if parse_device_index(uri).is_some() || uri.starts_with("/dev/video") {
            SourceKind::Device
        } else {
            SourceKind::File
        }
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

/// Open `uri` as a [`FrameSource`] producing frames at `target_size`.
///
/// Devices and RTSP feeds reconnect when their reader dies; files report end
/// of stream once exhausted.
pub fn open_source(uri: &str, target_size: (u32, u32)) -> Result<Box<dyn FrameSource>, CaptureError> {
    let kind = SourceKind::from_uri(uri);
    info!(source = uri, ?kind, "opening video source");
    let owned = uri.to_string();
    let source = match kind {
        SourceKind::Device => {
            let rx = spawn_device_reader(uri, target_size)?;
            ChannelSource::new(uri, rx, READ_TIMEOUT)
                .with_reopen(move || spawn_device_reader(&owned, target_size))
        }
        SourceKind::Rtsp => {
            let rx = spawn_rtsp_reader(uri, target_size)?;
            ChannelSource::new(uri, rx, READ_TIMEOUT)
                .with_reopen(move || spawn_rtsp_reader(&owned, target_size))
        }
        SourceKind::File => {
            let rx = spawn_file_reader(uri, target_size)?;
            ChannelSource::new(uri, rx, READ_TIMEOUT)
        }
    };
    Ok(Box::new(source))
}

#[cfg(feature = "opencv")]
fn spawn_device_reader(uri: &str, target_size: (u32, u32)) -> anyhow::Result<FrameReceiver> {
    spawn_camera_reader(uri, target_size)
}

#[cfg(not(feature = "opencv"))]
fn spawn_device_reader(uri: &str, target_size: (u32, u32)) -> anyhow::Result<FrameReceiver> {
    let device = match parse_device_index(uri) {
        Some(index) => format!("/dev/video{index}"),
        None => uri.to_string(),
    };
    spawn_v4l2_reader(&device, target_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sources() {
        assert_eq!(SourceKind::from_uri("0"), SourceKind::Device);
        assert_eq!(SourceKind::from_uri("/dev/video2"), SourceKind::Device);
        assert_eq!(SourceKind::from_uri("rtsp://cam/stream"), SourceKind::Rtsp);
        assert_eq!(SourceKind::from_uri("clips/demo.mp4"), SourceKind::File);
    }

    #[test]
    fn device_index_parsing() {
        assert_eq!(parse_device_index("3"), Some(3));
        assert_eq!(parse_device_index("/dev/video11"), Some(11));
        assert_eq!(parse_device_index("/dev/videoX"), None);
    }
}
