use std::collections::VecDeque;

use image::RgbImage;
use ml_core::{KeypointSet, types::joint};

use crate::{
    annotation,
    plugins::{
        FrameContext, Plugin, PluginError, PluginMetadata, PluginOutput,
        builtin::MIN_JOINT_CONFIDENCE,
    },
};

const HISTORY_LEN: usize = 20;
const MIN_SWING_PX: f32 = 20.0;
const MIN_REVERSALS: usize = 2;
const WAVE_COLOR: [u8; 3] = [0, 200, 255];

/// Horizontal wrist positions of one arm while it is held above the elbow.
#[derive(Debug, Default)]
struct ArmTrack {
    xs: VecDeque<f32>,
}

impl ArmTrack {
    fn observe(&mut self, person: &KeypointSet, wrist: usize, elbow: usize) -> Option<(f32, f32)> {
        let lifted = person
            .confident(wrist, MIN_JOINT_CONFIDENCE)
            .zip(person.confident(elbow, MIN_JOINT_CONFIDENCE))
            .filter(|(w, e)| w.y < e.y)
            .map(|(w, _)| (w.x, w.y));
        match lifted {
            Some((x, _)) => {
                if self.xs.len() == HISTORY_LEN {
                    self.xs.pop_front();
                }
                self.xs.push_back(x);
            }
            None => self.xs.clear(),
        }
        lifted
    }

    /// Direction changes whose swing reached `MIN_SWING_PX`.
    fn reversals(&self) -> usize {
        let mut iter = self.xs.iter().copied();
        let Some(mut pivot) = iter.next() else {
            return 0;
        };
        let mut direction = 0i8;
        let mut count = 0;
        for x in iter {
            let delta = x - pivot;
            if direction >= 0 && delta <= -MIN_SWING_PX {
                count += usize::from(direction > 0);
                direction = -1;
                pivot = x;
            } else if direction <= 0 && delta >= MIN_SWING_PX {
                count += usize::from(direction < 0);
                direction = 1;
                pivot = x;
            } else if (direction > 0 && x > pivot) || (direction < 0 && x < pivot) {
                pivot = x;
            }
        }
        count
    }
}

/// Detects a hand waving side to side above the elbow.
#[derive(Debug, Default)]
pub struct Waving {
    left: ArmTrack,
    right: ArmTrack,
}

impl Plugin for Waving {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("Wave Detector")
            .description("Detects a raised hand swinging side to side")
            .category("gesture")
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
        let arms = [
            (
                self.left.observe(person, joint::LEFT_WRIST, joint::LEFT_ELBOW),
                &self.left,
            ),
            (
                self.right.observe(person, joint::RIGHT_WRIST, joint::RIGHT_ELBOW),
                &self.right,
            ),
        ];

        let mut waving = false;
        for (wrist, track) in arms {
            let Some(wrist) = wrist else { continue };
            if track.reversals() >= MIN_REVERSALS {
                waving = true;
                annotation::draw_dot(annotated, wrist, 14, annotation::rgb(WAVE_COLOR));
            }
        }

        Ok(waving.then(|| PluginOutput::new("Waving detected", WAVE_COLOR)))
    }

    fn skipped(&mut self) {
        self.left.xs.clear();
        self.right.xs.clear();
    }
}
