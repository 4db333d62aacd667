use anyhow::{Error, anyhow};
use image::RgbImage;
use thiserror::Error;

/// Raw frame captured from a video source.
#[derive(Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
    Rgb8,
}

impl Frame {
    /// Convert the packed pixel buffer into an RGB image, swapping channels in
    /// place when the source delivered BGR.
    pub fn into_rgb_image(self) -> Result<RgbImage, CaptureError> {
        let Frame {
            mut data,
            width,
            height,
            format,
            ..
        } = self;
        let expected = (width as usize) * (height as usize) * 3;
        if data.len() != expected {
            return Err(CaptureError::Other(anyhow!(
                "frame buffer holds {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        if format == FrameFormat::Bgr8 {
            for pixel in data.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
        }
        RgbImage::from_raw(width, height, data)
            .ok_or_else(|| CaptureError::Other(anyhow!("failed to wrap frame buffer")))
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("no frame available from video source")]
    Unavailable,
    #[error("video source reached end of stream")]
    EndOfStream,
    #[error(transparent)]
    Other(#[from] Error),
}

impl CaptureError {
    /// Whether the caller should back off and retry rather than stop reading.
    pub fn is_transient(&self) -> bool {
        !matches!(self, CaptureError::EndOfStream)
    }
}
