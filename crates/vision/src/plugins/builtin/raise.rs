use image::{Rgb, RgbImage};
use ml_core::{KeypointSet, types::joint};

use crate::{
    annotation,
    plugins::{
        FrameContext, Plugin, PluginError, PluginMetadata, PluginOutput,
        builtin::MIN_JOINT_CONFIDENCE,
    },
};

/// Pixels the wrist must clear above the shoulder.
const RAISE_MARGIN_PX: f32 = 10.0;
const RAISE_COLOR: [u8; 3] = [0, 255, 0];

/// Reports a wrist held above its shoulder.
pub struct Raise;

impl Raise {
    fn raised(person: &KeypointSet, wrist: usize, shoulder: usize) -> Option<(f32, f32)> {
        let wrist = person.confident(wrist, MIN_JOINT_CONFIDENCE)?;
        let shoulder = person.confident(shoulder, MIN_JOINT_CONFIDENCE)?;
        (wrist.y < shoulder.y - RAISE_MARGIN_PX).then_some((wrist.x, wrist.y))
    }
}

impl Plugin for Raise {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("Hand Raise")
            .description("Alerts when a wrist is lifted above its shoulder")
            .category("gesture")
            .requires_keypoints()
    }

    fn run(
        &mut self,
        ctx: &FrameContext<'_>,
        annotated: &mut RgbImage,
    ) -> Result<Option<PluginOutput>, PluginError> {
        let person = ctx.require_keypoints()?;
        let left = Self::raised(person, joint::LEFT_WRIST, joint::LEFT_SHOULDER);
        let right = Self::raised(person, joint::RIGHT_WRIST, joint::RIGHT_SHOULDER);

        for wrist in left.iter().chain(right.iter()) {
            annotation::draw_dot(annotated, *wrist, 10, Rgb(RAISE_COLOR));
        }

        let message = match (left, right) {
            (Some(_), Some(_)) => "Both hands raised",
            (Some(_), None) => "Left hand raised",
            (None, Some(_)) => "Right hand raised",
            (None, None) => return Ok(None),
        };
        Ok(Some(PluginOutput::new(message, RAISE_COLOR)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::builtin::fixtures::{standing, with_joint};

    fn run(person: &KeypointSet) -> Option<PluginOutput> {
        let frame = RgbImage::new(400, 600);
        let mut annotated = frame.clone();
        let ctx = FrameContext {
            frame: &frame,
            keypoints: Some(person),
            hands: None,
            frame_number: 1,
        };
        Raise.run(&ctx, &mut annotated).unwrap()
    }

    #[test]
    fn arms_down_is_quiet() {
        assert!(run(&standing()).is_none());
    }

    #[test]
    fn reports_which_hand_is_up() {
        let left_up = with_joint(standing(), joint::LEFT_WRIST, 270.0, 120.0);
        assert_eq!(run(&left_up).unwrap().message, "Left hand raised");

        let both_up = with_joint(left_up, joint::RIGHT_WRIST, 130.0, 110.0);
        let output = run(&both_up).unwrap();
        assert_eq!(output.message, "Both hands raised");
        assert_eq!(output.color, vec![0, 255, 0]);
    }

    #[test]
    fn low_confidence_wrists_are_ignored() {
        let mut person = with_joint(standing(), joint::RIGHT_WRIST, 130.0, 110.0);
        person.points[joint::RIGHT_WRIST].confidence = 0.1;
        assert!(run(&person).is_none());
    }
}
