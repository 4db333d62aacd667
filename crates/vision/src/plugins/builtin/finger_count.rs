use image::{Rgb, RgbImage};
use ml_core::{Hand, types::landmark};

use crate::{
    annotation,
    plugins::{
        FrameContext, Plugin, PluginError, PluginMetadata, PluginOutput,
        builtin::distance,
    },
};

const FINGERS: [(usize, usize); 4] = [
    (landmark::INDEX_PIP, landmark::INDEX_TIP),
    (landmark::MIDDLE_PIP, landmark::MIDDLE_TIP),
    (landmark::RING_PIP, landmark::RING_TIP),
    (landmark::PINKY_PIP, landmark::PINKY_TIP),
];

/// Tip must reach this much further from the wrist than its middle joint.
const EXTENSION_RATIO: f32 = 1.1;

/// Counts raised fingers across every detected hand.
pub struct FingerCount;

impl FingerCount {
    /// Extended fingers on one hand, thumb included.
    pub fn count(hand: &Hand) -> usize {
        if !hand.is_complete() {
            return 0;
        }
        let point = |index: usize| &hand.landmarks[index];
        let wrist = point(landmark::WRIST);
        let from_wrist = |index: usize| distance(point(index).x, point(index).y, wrist.x, wrist.y);

        let fingers = FINGERS
            .iter()
            .filter(|&&(pip, tip)| from_wrist(tip) > from_wrist(pip) * EXTENSION_RATIO)
            .count();

        // The thumb folds across the palm, so measure against the pinky base.
        let pinky = point(landmark::PINKY_MCP);
        let thumb_tip = point(landmark::THUMB_TIP);
        let thumb_ip = point(landmark::THUMB_IP);
        let thumb_out = distance(thumb_tip.x, thumb_tip.y, pinky.x, pinky.y)
            > distance(thumb_ip.x, thumb_ip.y, pinky.x, pinky.y) * EXTENSION_RATIO;

        fingers + usize::from(thumb_out)
    }
}

impl Plugin for FingerCount {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("Finger Counter")
            .description("Counts raised fingers on every visible hand")
            .category("gesture")
            .requires_hands()
    }

    fn run(
        &mut self,
        ctx: &FrameContext<'_>,
        annotated: &mut RgbImage,
    ) -> Result<Option<PluginOutput>, PluginError> {
        let hands = ctx.require_hands()?;
        let mut total = 0;
        for hand in hands.iter() {
            let count = Self::count(hand);
            total += count;
            if let Some(wrist) = hand.landmark(landmark::WRIST) {
                annotation::draw_label(
                    annotated,
                    wrist.x as i32 - 6,
                    wrist.y as i32 + 12,
                    &count.to_string(),
                    Rgb([255, 0, 255]),
                    3,
                );
            }
        }
        Ok(Some(PluginOutput::new(
            format!("Fingers: {total}"),
            [255, 0, 255],
        )))
    }
}

#[cfg(test)]
mod tests {
    use ml_core::{HandLandmarks, Landmark};

    use super::*;

    /// Upright hand with the given fingers (thumb, index, middle, ring, pinky) extended.
    fn hand(extended: [bool; 5]) -> Hand {
        let mut points = vec![Landmark::new(0.0, 0.0, 0.0); 21];
        points[landmark::WRIST] = Landmark::new(100.0, 200.0, 0.0);
        // Thumb chain runs out to the left; folded, its tip crosses the palm.
        points[landmark::THUMB_CMC] = Landmark::new(85.0, 185.0, 0.0);
        points[landmark::THUMB_MCP] = Landmark::new(75.0, 175.0, 0.0);
        points[landmark::THUMB_IP] = Landmark::new(68.0, 168.0, 0.0);
        points[landmark::THUMB_TIP] = if extended[0] {
            Landmark::new(40.0, 160.0, 0.0)
        } else {
            Landmark::new(95.0, 165.0, 0.0)
        };
        for (finger, column) in [(1usize, 85.0f32), (2, 100.0), (3, 115.0), (4, 130.0)] {
            let base = 1 + finger * 4;
            points[base] = Landmark::new(column, 140.0, 0.0);
            points[base + 1] = Landmark::new(column, 115.0, 0.0);
            points[base + 2] = Landmark::new(column, 100.0, 0.0);
            points[base + 3] = if extended[finger] {
                Landmark::new(column, 80.0, 0.0)
            } else {
                Landmark::new(column, 150.0, 0.0)
            };
        }
        Hand {
            landmarks: points,
            handedness: None,
            score: 0.9,
        }
    }

    fn run(hands: Vec<Hand>) -> PluginOutput {
        let frame = RgbImage::new(320, 240);
        let mut annotated = frame.clone();
        let hands = HandLandmarks { hands };
        let ctx = FrameContext {
            frame: &frame,
            keypoints: None,
            hands: Some(&hands),
            frame_number: 1,
        };
        FingerCount.run(&ctx, &mut annotated).unwrap().unwrap()
    }

    #[test]
    fn counts_open_and_closed_hands() {
        assert_eq!(FingerCount::count(&hand([true; 5])), 5);
        assert_eq!(FingerCount::count(&hand([false; 5])), 0);
        assert_eq!(FingerCount::count(&hand([false, true, true, false, false])), 2);
    }

    #[test]
    fn totals_across_hands() {
        let output = run(vec![hand([true; 5]), hand([false, true, false, false, false])]);
        assert_eq!(output.message, "Fingers: 6");
    }

    #[test]
    fn partial_hands_count_zero() {
        let mut partial = hand([true; 5]);
        partial.landmarks.truncate(10);
        assert_eq!(FingerCount::count(&partial), 0);
    }

    #[test]
    fn missing_hands_is_an_input_error() {
        let frame = RgbImage::new(4, 4);
        let mut annotated = frame.clone();
        let ctx = FrameContext {
            frame: &frame,
            keypoints: None,
            hands: None,
            frame_number: 1,
        };
        assert!(matches!(
            FingerCount.run(&ctx, &mut annotated),
            Err(PluginError::MissingInput("hands"))
        ));
    }
}
