//! CPU drawing helpers for the annotated frame.
//!
//! Text uses a built-in 5x7 bitmap font scaled by whole pixels; shapes go
//! through `imageproc`. Every helper clips to the image bounds.

use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut},
    rect::Rect,
};
use ml_core::{COCO_SKELETON, HAND_CONNECTIONS, Hand, KeypointSet};

use crate::data::{AlertColor, PluginAlert};

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;

const SKELETON_COLOR: Rgb<u8> = Rgb([255, 128, 0]);
const JOINT_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
const HAND_LINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const HAND_POINT_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const TITLE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const INFO_COLOR: Rgb<u8> = Rgb([200, 200, 200]);

pub fn rgb(color: AlertColor) -> Rgb<u8> {
    Rgb(color)
}

/// Width in pixels of `text` drawn at `scale`.
pub fn text_width(text: &str, scale: u32) -> i32 {
    let chars = text.chars().count() as i32;
    if chars == 0 {
        return 0;
    }
    (chars * GLYPH_ADVANCE - 1) * scale.max(1) as i32
}

pub fn text_height(scale: u32) -> i32 {
    GLYPH_HEIGHT * scale.max(1) as i32
}

/// Draw `text` with its top-left corner at `(x, y)`. Lowercase is upper-cased.
pub fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>, scale: u32) {
    let scale = scale.max(1) as i32;
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        fill_rect(
                            image,
                            x + col * scale,
                            y + row as i32 * scale,
                            x + (col + 1) * scale - 1,
                            y + (row as i32 + 1) * scale - 1,
                            color,
                        );
                    }
                }
            }
        }
        x += GLYPH_ADVANCE * scale;
    }
}

/// Fill the inclusive rectangle `left..=right` x `top..=bottom`.
pub fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    if let Some(rect) = clipped_rect(image, left, top, right, bottom) {
        draw_filled_rect_mut(image, rect, color);
    }
}

/// Darken the inclusive rectangle, keeping `1 - alpha` of each pixel.
pub fn shade_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, alpha: f32) {
    let Some(rect) = clipped_rect(image, left, top, right, bottom) else {
        return;
    };
    let keep = (1.0 - alpha).clamp(0.0, 1.0);
    for y in rect.top()..=rect.bottom() {
        for x in rect.left()..=rect.right() {
            let pixel = image.get_pixel_mut(x as u32, y as u32);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * keep).round() as u8;
            }
        }
    }
}

fn clipped_rect(image: &RgbImage, left: i32, top: i32, right: i32, bottom: i32) -> Option<Rect> {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(width - 1);
    let bottom = bottom.min(height - 1);
    if left > right || top > bottom {
        return None;
    }
    Some(Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32))
}

/// Line segment drawn `thickness` pixels wide.
pub fn draw_line(image: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>, thickness: i32) {
    let half = thickness.max(1) / 2;
    let steep = (to.1 - from.1).abs() > (to.0 - from.0).abs();
    for offset in -half..=half {
        let shift = offset as f32;
        let (a, b) = if steep {
            ((from.0 + shift, from.1), (to.0 + shift, to.1))
        } else {
            ((from.0, from.1 + shift), (to.0, to.1 + shift))
        };
        draw_line_segment_mut(image, a, b, color);
    }
}

pub fn draw_dot(image: &mut RgbImage, center: (f32, f32), radius: i32, color: Rgb<u8>) {
    draw_filled_circle_mut(
        image,
        (center.0.round() as i32, center.1.round() as i32),
        radius,
        color,
    );
}

/// COCO-17 bones and joints whose confidence reaches `min_confidence`.
pub fn draw_skeleton(image: &mut RgbImage, person: &KeypointSet, min_confidence: f32) {
    for &(a, b) in COCO_SKELETON.iter() {
        if let (Some(pa), Some(pb)) = (
            person.confident(a, min_confidence),
            person.confident(b, min_confidence),
        ) {
            draw_line(image, (pa.x, pa.y), (pb.x, pb.y), SKELETON_COLOR, 3);
        }
    }
    for kp in person.points.iter().filter(|kp| kp.confidence >= min_confidence) {
        draw_dot(image, (kp.x, kp.y), 4, JOINT_COLOR);
    }
}

pub fn draw_hand(image: &mut RgbImage, hand: &Hand) {
    for &(a, b) in HAND_CONNECTIONS.iter() {
        if let (Some(pa), Some(pb)) = (hand.landmark(a), hand.landmark(b)) {
            draw_line(image, (pa.x, pa.y), (pb.x, pb.y), HAND_LINE_COLOR, 2);
        }
    }
    for point in &hand.landmarks {
        draw_dot(image, (point.x, point.y), 2, HAND_POINT_COLOR);
    }
}

/// Title, frame counter and active-plugin count owned by the detection loop.
pub fn draw_loop_overlays(image: &mut RgbImage, frame_number: u64, active_plugins: usize) {
    let height = image.height() as i32;
    draw_label(image, 10, 10, "LIVE DETECTION", TITLE_COLOR, 3);
    draw_label(
        image,
        10,
        height - 30,
        &format!("FRAME: {frame_number}"),
        INFO_COLOR,
        2,
    );
    draw_label(
        image,
        10,
        height - 55,
        &format!("PLUGINS: {active_plugins} ACTIVE"),
        INFO_COLOR,
        2,
    );
}

/// Stack the cycle's alerts in the top-right corner, each in its colour.
pub fn draw_alert_panel(image: &mut RgbImage, alerts: &[PluginAlert]) {
    if alerts.is_empty() {
        return;
    }
    const SCALE: u32 = 2;
    const PADDING: i32 = 8;
    const SWATCH: i32 = 12;
    let row_height = text_height(SCALE) + PADDING;
    let widest = alerts
        .iter()
        .map(|alert| text_width(&alert.message, SCALE))
        .max()
        .unwrap_or(0);
    let panel_width = widest + SWATCH + PADDING * 3;
    let panel_height = row_height * alerts.len() as i32 + PADDING;
    let right = image.width() as i32 - 10;
    let left = (right - panel_width).max(0);
    let top = 10;

    shade_rect(image, left, top, right, top + panel_height, 0.6);
    for (row, alert) in alerts.iter().enumerate() {
        let y = top + PADDING + row as i32 * row_height;
        let color = rgb(alert.color);
        fill_rect(image, left + PADDING, y, left + PADDING + SWATCH - 1, y + SWATCH - 1, color);
        draw_label(image, left + PADDING * 2 + SWATCH, y, &alert.message, color, SCALE);
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '!' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00000, 0b00100],
        '?' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b00000, 0b00100],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        ',' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00110, 0b00100, 0b01000],
        '\'' => [0b00100, 0b00100, 0b01000, 0b00000, 0b00000, 0b00000, 0b00000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|p| p.0 != [0, 0, 0]).count()
    }

    #[test]
    fn labels_clip_at_the_edges() {
        let mut image = RgbImage::new(20, 10);
        draw_label(&mut image, 15, 5, "WIDE TEXT", Rgb([255, 255, 255]), 2);
        draw_label(&mut image, -40, -3, "OFF", Rgb([255, 255, 255]), 1);
        assert!(lit_pixels(&image) > 0);
    }

    #[test]
    fn text_width_scales() {
        assert_eq!(text_width("", 2), 0);
        assert_eq!(text_width("AB", 1), 11);
        assert_eq!(text_width("AB", 2), 22);
    }

    #[test]
    fn shade_darkens_only_inside() {
        let mut image = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        shade_rect(&mut image, 0, 0, 1, 1, 0.5);
        assert_eq!(image.get_pixel(0, 0).0, [50, 50, 50]);
        assert_eq!(image.get_pixel(3, 3).0, [100, 100, 100]);
        shade_rect(&mut image, 10, 10, 20, 20, 0.5);
    }

    #[test]
    fn alert_panel_draws_in_alert_colour() {
        let mut image = RgbImage::new(320, 120);
        let alerts = vec![PluginAlert {
            plugin: "raise",
            message: "Hand raised".into(),
            color: [0, 255, 0],
        }];
        draw_alert_panel(&mut image, &alerts);
        assert!(image.pixels().any(|p| p.0 == [0, 255, 0]));
        // Panel hugs the right edge.
        assert!((0..100).all(|x| image.get_pixel(x, 20).0 == [0, 0, 0]));
        assert_ne!(image.get_pixel(300, 20).0, [255, 255, 255]);
    }

    #[test]
    fn every_overlay_character_has_a_glyph() {
        for ch in "LIVE DETECTION FRAME: 0123456789 PLUGINS: ACTIVE".chars() {
            assert!(glyph_bits(ch).is_some(), "missing glyph for {ch:?}");
        }
    }
}
