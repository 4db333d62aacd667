//! Plugin contract: independent analysis routines run once per frame.
//!
//! A plugin reads the cycle's inference output through [`FrameContext`], may
//! draw onto the annotated frame, and optionally returns one [`PluginOutput`].
//! Plugins never keep references to frame-scoped data past the call; the
//! borrow checker enforces that through the context lifetime.

pub mod builtin;
pub mod registry;

use image::RgbImage;
use ml_core::{HandLandmarks, KeypointSet};
use thiserror::Error;

use crate::data::AlertColor;

pub use registry::{DispatchReport, PluginDescriptor, PluginFactory, PluginGating, PluginRegistry};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("required input `{0}` is absent")]
    MissingInput(&'static str),
    #[error("{0}")]
    Failed(String),
}

/// Static description a plugin reports once at discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PluginMetadata {
    pub display_name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub category: &'static str,
    pub requires_keypoints: bool,
    pub requires_hands: bool,
}

impl PluginMetadata {
    pub const fn new(display_name: &'static str) -> Self {
        Self {
            display_name,
            description: "No description available",
            version: "1.0",
            category: "general",
            requires_keypoints: false,
            requires_hands: false,
        }
    }

    pub const fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub const fn category(mut self, category: &'static str) -> Self {
        self.category = category;
        self
    }

    pub const fn requires_keypoints(mut self) -> Self {
        self.requires_keypoints = true;
        self
    }

    pub const fn requires_hands(mut self) -> Self {
        self.requires_hands = true;
        self
    }
}

/// Read-only inputs for one plugin invocation.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext<'a> {
    /// Frame as captured, before any overlay was drawn.
    pub frame: &'a RgbImage,
    pub keypoints: Option<&'a KeypointSet>,
    pub hands: Option<&'a HandLandmarks>,
    pub frame_number: u64,
}

impl<'a> FrameContext<'a> {
    pub fn require_keypoints(&self) -> Result<&'a KeypointSet, PluginError> {
        self.keypoints.ok_or(PluginError::MissingInput("keypoints"))
    }

    pub fn require_hands(&self) -> Result<&'a HandLandmarks, PluginError> {
        self.hands.ok_or(PluginError::MissingInput("hands"))
    }
}

/// Raw plugin result; checked by the registry before it reaches an alert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginOutput {
    pub message: String,
    pub color: Vec<i32>,
}

impl PluginOutput {
    pub fn new(message: impl Into<String>, color: AlertColor) -> Self {
        Self {
            message: message.into(),
            color: color.iter().map(|&c| i32::from(c)).collect(),
        }
    }

    /// Build an output from loosely-shaped parts (e.g. computed colours).
    pub fn from_parts(message: impl Into<String>, color: Vec<i32>) -> Self {
        Self {
            message: message.into(),
            color,
        }
    }

    /// Message and colour when both are well formed: a non-blank message and
    /// exactly three components in `0..=255`.
    pub fn validate(self) -> Option<(String, AlertColor)> {
        if self.message.trim().is_empty() {
            return None;
        }
        let [r, g, b] = <[i32; 3]>::try_from(self.color).ok()?;
        let channel = |value: i32| u8::try_from(value).ok();
        Some((self.message, [channel(r)?, channel(g)?, channel(b)?]))
    }
}

/// A per-frame analysis routine.
pub trait Plugin: Send {
    fn metadata(&self) -> PluginMetadata;

    /// Inspect one frame; may draw onto `annotated`.
    fn run(
        &mut self,
        ctx: &FrameContext<'_>,
        annotated: &mut RgbImage,
    ) -> Result<Option<PluginOutput>, PluginError>;

    /// Called instead of `run` on a frame that lacks the plugin's declared
    /// inputs. Plugins that track state across frames drop it here.
    fn skipped(&mut self) {}
}
