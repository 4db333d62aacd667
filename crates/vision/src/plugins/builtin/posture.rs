use image::RgbImage;
use ml_core::{KeypointSet, types::joint};

use crate::{
    annotation,
    plugins::{
        FrameContext, Plugin, PluginError, PluginMetadata, PluginOutput,
        builtin::{MIN_JOINT_CONFIDENCE, joint_distance},
    },
};

/// Shoulder line steeper than this (degrees) counts as tilted.
const MAX_SHOULDER_TILT_DEG: f32 = 12.0;
/// Nose must sit at least this fraction of shoulder width above the shoulders.
const MIN_HEAD_LIFT_RATIO: f32 = 0.35;
/// Consecutive frames a problem must persist before it is reported.
const PERSIST_FRAMES: u32 = 3;
const POSTURE_COLOR: [u8; 3] = [255, 80, 0];

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Findings {
    head_down: bool,
    shoulders_tilted: bool,
}

impl Findings {
    fn assess(person: &KeypointSet) -> Option<Self> {
        let left = person.confident(joint::LEFT_SHOULDER, MIN_JOINT_CONFIDENCE)?;
        let right = person.confident(joint::RIGHT_SHOULDER, MIN_JOINT_CONFIDENCE)?;
        let width = joint_distance(left, right);
        if width < 1.0 {
            return None;
        }
        let tilt = (left.y - right.y)
            .abs()
            .atan2((left.x - right.x).abs())
            .to_degrees();
        let shoulder_line = (left.y + right.y) / 2.0;
        let head_down = person
            .confident(joint::NOSE, MIN_JOINT_CONFIDENCE)
            .is_some_and(|nose| nose.y > shoulder_line - width * MIN_HEAD_LIFT_RATIO);
        Some(Self {
            head_down,
            shoulders_tilted: tilt > MAX_SHOULDER_TILT_DEG,
        })
    }
}

/// Flags a dropped head or uneven shoulders once they persist for a few frames.
#[derive(Debug, Default)]
pub struct Posture {
    head_down_frames: u32,
    tilted_frames: u32,
}

impl Posture {
    fn bump(counter: &mut u32, active: bool) -> bool {
        *counter = if active { counter.saturating_add(1) } else { 0 };
        *counter >= PERSIST_FRAMES
    }
}

impl Plugin for Posture {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("Posture Monitor")
            .description("Warns about a dropped head or uneven shoulders")
            .version("1.1")
            .category("posture")
            .requires_keypoints()
    }

    fn run(
        &mut self,
        ctx: &FrameContext<'_>,
        annotated: &mut RgbImage,
    ) -> Result<Option<PluginOutput>, PluginError> {
        let person = match ctx.require_keypoints() {
            Ok(person) => person,
            Err(err) => {
                self.skipped();
                return Err(err);
            }
        };
        let findings = Findings::assess(person).unwrap_or_default();
        let head_down = Self::bump(&mut self.head_down_frames, findings.head_down);
        let tilted = Self::bump(&mut self.tilted_frames, findings.shoulders_tilted);

        if tilted {
            if let (Some(l), Some(r)) = (
                person.get(joint::LEFT_SHOULDER),
                person.get(joint::RIGHT_SHOULDER),
            ) {
                annotation::draw_line(
                    annotated,
                    (l.x, l.y),
                    (r.x, r.y),
                    annotation::rgb(POSTURE_COLOR),
                    5,
                );
            }
        }

        let message = match (head_down, tilted) {
            (true, true) => "Poor posture: head down, shoulders uneven",
            (true, false) => "Head down: sit up straight",
            (false, true) => "Uneven shoulders",
            (false, false) => return Ok(None),
        };
        Ok(Some(PluginOutput::new(message, POSTURE_COLOR)))
    }

    fn skipped(&mut self) {
        self.head_down_frames = 0;
        self.tilted_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::builtin::fixtures::{standing, with_joint};

    fn step(plugin: &mut Posture, person: &KeypointSet) -> Option<String> {
        let frame = RgbImage::new(400, 600);
        let mut annotated = frame.clone();
        let ctx = FrameContext {
            frame: &frame,
            keypoints: Some(person),
            hands: None,
            frame_number: 1,
        };
        plugin
            .run(&ctx, &mut annotated)
            .unwrap()
            .map(|output| output.message)
    }

    #[test]
    fn upright_person_is_fine() {
        let mut plugin = Posture::default();
        for _ in 0..5 {
            assert!(step(&mut plugin, &standing()).is_none());
        }
    }

    #[test]
    fn dropped_head_is_reported_after_it_persists() {
        let slumped = with_joint(standing(), joint::NOSE, 200.0, 170.0);
        let mut plugin = Posture::default();
        assert!(step(&mut plugin, &slumped).is_none());
        assert!(step(&mut plugin, &slumped).is_none());
        assert_eq!(
            step(&mut plugin, &slumped).as_deref(),
            Some("Head down: sit up straight")
        );
        // One good frame clears the streak.
        assert!(step(&mut plugin, &standing()).is_none());
        assert!(step(&mut plugin, &slumped).is_none());
    }

    #[test]
    fn tilted_shoulders_are_reported() {
        let tilted = with_joint(standing(), joint::LEFT_SHOULDER, 250.0, 215.0);
        let mut plugin = Posture::default();
        let messages: Vec<_> = (0..3).map(|_| step(&mut plugin, &tilted)).collect();
        assert_eq!(messages[2].as_deref(), Some("Uneven shoulders"));
    }

    #[test]
    fn streak_restarts_after_a_frame_without_a_person() {
        let slumped = with_joint(standing(), joint::NOSE, 200.0, 170.0);
        let mut plugin = Posture::default();
        step(&mut plugin, &slumped);
        step(&mut plugin, &slumped);
        plugin.skipped();
        assert!(step(&mut plugin, &slumped).is_none());
        assert!(step(&mut plugin, &slumped).is_none());
        assert!(step(&mut plugin, &slumped).is_some());
    }
}
