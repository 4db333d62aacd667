//! JPEG encoding for the stream and screenshot capture.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::{Rgb, RgbImage, codecs::jpeg::JpegEncoder};

use crate::{annotation, data::FrameCycleOutput};

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

/// Write the output's annotated frame to `dir` as `screenshot_<unix-seconds>.jpg`.
///
/// Returns the file name.
pub fn save_capture(output: &FrameCycleOutput, dir: &Path, quality: u8) -> Result<String> {
    let filename = format!("screenshot_{}.jpg", chrono::Utc::now().timestamp());
    let jpeg = output.jpeg(quality)?;
    let path = dir.join(&filename);
    std::fs::write(&path, &jpeg[..])
        .with_context(|| format!("failed to write capture {}", path.display()))?;
    Ok(filename)
}

/// Dark frame with a centred caption, served while no live frame is available.
pub fn placeholder_frame(width: u32, height: u32, caption: &str) -> RgbImage {
    let mut image = RgbImage::from_pixel(width.max(1), height.max(1), Rgb([24, 24, 24]));
    let scale = 3;
    let x = (width as i32 - annotation::text_width(caption, scale)) / 2;
    let y = (height as i32 - annotation::text_height(scale)) / 2;
    annotation::draw_label(&mut image, x, y, caption, Rgb([200, 200, 200]), scale);
    image
}
