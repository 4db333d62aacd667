//! Plugins compiled into the binary.

mod finger_count;
mod posture;
mod raise;
mod waving;

pub use finger_count::FingerCount;
pub use posture::Posture;
pub use raise::Raise;
pub use waving::Waving;

use ml_core::Keypoint;

use crate::plugins::{Plugin, PluginFactory};

/// Plugins enabled at startup unless configured otherwise.
pub const DEFAULT_ENABLED: [&str; 2] = ["finger_count", "raise"];

/// Minimum joint confidence the pose plugins trust.
pub(crate) const MIN_JOINT_CONFIDENCE: f32 = 0.5;

/// Discovery table of the built-in plugins, in registration order.
pub fn catalog() -> Vec<PluginFactory> {
    vec![
        PluginFactory::new("finger_count", || Ok(Box::new(FingerCount) as Box<dyn Plugin>)),
        PluginFactory::new("raise", || Ok(Box::new(Raise) as Box<dyn Plugin>)),
        PluginFactory::new("waving", || Ok(Box::new(Waving::default()) as Box<dyn Plugin>)),
        PluginFactory::new("posture", || Ok(Box::new(Posture::default()) as Box<dyn Plugin>)),
    ]
}

pub(crate) fn distance(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

pub(crate) fn joint_distance(a: &Keypoint, b: &Keypoint) -> f32 {
    distance(a.x, a.y, b.x, b.y)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PluginRegistry;

    #[test]
    fn catalog_registers_every_builtin() {
        let registry = PluginRegistry::discover(&catalog());
        let ids: Vec<_> = registry.descriptors().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["finger_count", "raise", "waving", "posture"]);
        assert!(DEFAULT_ENABLED.iter().all(|id| registry.contains(id)));

        let finger = registry.descriptor("finger_count").unwrap();
        assert!(finger.requires_hands && !finger.requires_keypoints);
        let raise = registry.descriptor("raise").unwrap();
        assert!(raise.requires_keypoints && !raise.requires_hands);
    }
}
