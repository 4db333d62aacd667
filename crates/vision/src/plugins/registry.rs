//! Registration table of discovered plugins and their enabled flags.
//!
//! Slots are fixed after discovery. The `enabled` flags are atomics so HTTP
//! control requests can flip them while the detection loop dispatches; each
//! dispatch snapshots the enabled set once before running anything.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    data::PluginAlert,
    error::{PipelineError, panic_message},
    plugins::{FrameContext, Plugin, PluginError, PluginMetadata},
};

/// Constructor for one plugin unit.
pub type PluginBuilder = fn() -> Result<Box<dyn Plugin>, PluginError>;

/// Entry in a discovery table: the plugin id and how to build it.
#[derive(Clone, Copy)]
pub struct PluginFactory {
    pub id: &'static str,
    pub build: PluginBuilder,
}

impl PluginFactory {
    pub const fn new(id: &'static str, build: PluginBuilder) -> Self {
        Self { id, build }
    }
}

/// Whether capability flags gate execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PluginGating {
    /// Skip a plugin when an input it requires is absent.
    #[default]
    RequireInputs,
    /// Run every enabled plugin regardless of its declared inputs.
    Legacy,
}

/// Wire form of a plugin's metadata and enabled flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    pub category: String,
    pub requires_keypoints: bool,
    pub requires_hands: bool,
    pub enabled: bool,
}

/// What one dispatch did.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Enabled ids at the start of dispatch, in registration order.
    pub enabled: Vec<&'static str>,
    pub alerts: Vec<PluginAlert>,
    pub skipped: Vec<&'static str>,
    pub failed: Vec<&'static str>,
    pub discarded: Vec<&'static str>,
}

struct PluginSlot {
    id: &'static str,
    metadata: PluginMetadata,
    enabled: AtomicBool,
    instance: Mutex<Box<dyn Plugin>>,
}

impl PluginSlot {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: self.id.to_string(),
            display_name: self.metadata.display_name.to_string(),
            description: self.metadata.description.to_string(),
            version: self.metadata.version.to_string(),
            category: self.metadata.category.to_string(),
            requires_keypoints: self.metadata.requires_keypoints,
            requires_hands: self.metadata.requires_hands,
            enabled: self.enabled.load(Ordering::Acquire),
        }
    }

    fn inputs_available(&self, ctx: &FrameContext<'_>) -> bool {
        (!self.metadata.requires_keypoints || ctx.keypoints.is_some())
            && (!self.metadata.requires_hands || ctx.hands.is_some())
    }

    fn skip(&self) {
        let mut plugin = self.instance.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| plugin.skipped())) {
            warn!(plugin = self.id, "skip hook panicked: {}", panic_message(payload));
        }
    }
}

pub struct PluginRegistry {
    slots: Vec<PluginSlot>,
    gating: PluginGating,
}

impl PluginRegistry {
    /// Instantiate every factory once, registering each plugin disabled.
    ///
    /// A factory that errors or panics is logged and left out; discovery
    /// carries on with the rest. Duplicate ids keep the first registration.
    pub fn discover(factories: &[PluginFactory]) -> Self {
        let mut slots: Vec<PluginSlot> = Vec::with_capacity(factories.len());
        for factory in factories {
            if slots.iter().any(|slot| slot.id == factory.id) {
                warn!(plugin = factory.id, "duplicate plugin id; keeping the first");
                continue;
            }
            let built = panic::catch_unwind(factory.build)
                .unwrap_or_else(|payload| Err(PluginError::Failed(panic_message(payload))));
            match built {
                Ok(instance) => {
                    let metadata = instance.metadata();
                    info!(plugin = factory.id, "discovered {}", metadata.display_name);
                    slots.push(PluginSlot {
                        id: factory.id,
                        metadata,
                        enabled: AtomicBool::new(false),
                        instance: Mutex::new(instance),
                    });
                }
                Err(err) => warn!(plugin = factory.id, "failed to load plugin: {err}"),
            }
        }
        Self {
            slots,
            gating: PluginGating::default(),
        }
    }

    pub fn with_gating(mut self, gating: PluginGating) -> Self {
        self.gating = gating;
        self
    }

    pub fn gating(&self) -> PluginGating {
        self.gating
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slot(id).is_some()
    }

    fn slot(&self, id: &str) -> Option<&PluginSlot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    fn known(&self, id: &str) -> Result<&PluginSlot, PipelineError> {
        self.slot(id)
            .ok_or_else(|| PipelineError::UnknownPlugin(id.to_string()))
    }

    pub fn enable(&self, id: &str) -> Result<(), PipelineError> {
        let slot = self.known(id)?;
        if !slot.enabled.swap(true, Ordering::AcqRel) {
            info!(plugin = id, "enabled {}", slot.metadata.display_name);
        }
        Ok(())
    }

    pub fn disable(&self, id: &str) -> Result<(), PipelineError> {
        let slot = self.known(id)?;
        if slot.enabled.swap(false, Ordering::AcqRel) {
            info!(plugin = id, "disabled {}", slot.metadata.display_name);
        }
        Ok(())
    }

    /// Flip a plugin's flag and return the new state.
    pub fn toggle(&self, id: &str) -> Result<bool, PipelineError> {
        let slot = self.known(id)?;
        let enabled = !slot.enabled.fetch_xor(true, Ordering::AcqRel);
        info!(plugin = id, enabled, "toggled {}", slot.metadata.display_name);
        Ok(enabled)
    }

    /// Enable or disable every plugin; returns how many were updated.
    pub fn set_all(&self, enabled: bool) -> usize {
        self.slots
            .iter()
            .map(|slot| slot.id)
            .filter(|id| {
                let result = if enabled {
                    self.enable(id)
                } else {
                    self.disable(id)
                };
                result.is_ok()
            })
            .count()
    }

    /// Enabled ids in registration order.
    pub fn enabled_ids(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|slot| slot.enabled.load(Ordering::Acquire))
            .map(|slot| slot.id)
            .collect()
    }

    pub fn is_enabled(&self, id: &str) -> Option<bool> {
        self.slot(id).map(|slot| slot.enabled.load(Ordering::Acquire))
    }

    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.slots.iter().map(PluginSlot::descriptor).collect()
    }

    pub fn descriptor(&self, id: &str) -> Option<PluginDescriptor> {
        self.slot(id).map(PluginSlot::descriptor)
    }

    /// Run the currently enabled plugins in registration order.
    ///
    /// Failures and panics are contained per plugin; malformed results are
    /// dropped. Toggles that land mid-dispatch apply from the next call.
    pub fn run_all(&self, ctx: &FrameContext<'_>, annotated: &mut RgbImage) -> DispatchReport {
        let active: Vec<&PluginSlot> = self
            .slots
            .iter()
            .filter(|slot| slot.enabled.load(Ordering::Acquire))
            .collect();
        let mut report = DispatchReport {
            enabled: active.iter().map(|slot| slot.id).collect(),
            ..DispatchReport::default()
        };

        for slot in active {
            if self.gating == PluginGating::RequireInputs && !slot.inputs_available(ctx) {
                slot.skip();
                report.skipped.push(slot.id);
                continue;
            }

            let mut plugin = slot.instance.lock().unwrap_or_else(PoisonError::into_inner);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| plugin.run(ctx, annotated)))
                .unwrap_or_else(|payload| Err(PluginError::Failed(panic_message(payload))));
            drop(plugin);

            match outcome {
                Ok(Some(output)) => match output.validate() {
                    Some((message, color)) => report.alerts.push(PluginAlert {
                        plugin: slot.id,
                        message,
                        color,
                    }),
                    None => {
                        debug!(plugin = slot.id, "discarded malformed plugin result");
                        metrics::counter!("vision_plugin_discarded_results_total", "plugin" => slot.id)
                            .increment(1);
                        report.discarded.push(slot.id);
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    let failure = PipelineError::PluginFailure {
                        plugin: slot.id.to_string(),
                        reason: err.to_string(),
                    };
                    match err {
                        PluginError::MissingInput(_) => debug!(plugin = slot.id, "{failure}"),
                        PluginError::Failed(_) => warn!(plugin = slot.id, "{failure}"),
                    }
                    metrics::counter!("vision_plugin_failures_total", "plugin" => slot.id)
                        .increment(1);
                    report.failed.push(slot.id);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use ml_core::{KeypointSet, types::joint};

    use super::*;
    use crate::plugins::{
        PluginOutput,
        builtin::{self, fixtures},
    };

    struct Echo(&'static str);

    impl Plugin for Echo {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("Echo")
        }

        fn run(
            &mut self,
            _ctx: &FrameContext<'_>,
            _annotated: &mut RgbImage,
        ) -> Result<Option<PluginOutput>, PluginError> {
            Ok(Some(PluginOutput::new(self.0, [10, 20, 30])))
        }
    }

    struct Panics;

    impl Plugin for Panics {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("Panics")
        }

        fn run(
            &mut self,
            _ctx: &FrameContext<'_>,
            _annotated: &mut RgbImage,
        ) -> Result<Option<PluginOutput>, PluginError> {
            panic!("plugin bug");
        }
    }

    struct NeedsHands;

    impl Plugin for NeedsHands {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("Needs hands").requires_hands()
        }

        fn run(
            &mut self,
            ctx: &FrameContext<'_>,
            _annotated: &mut RgbImage,
        ) -> Result<Option<PluginOutput>, PluginError> {
            ctx.require_hands()?;
            Ok(Some(PluginOutput::new("hands seen", [1, 1, 1])))
        }
    }

    struct BadColor;

    impl Plugin for BadColor {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("Bad colour")
        }

        fn run(
            &mut self,
            _ctx: &FrameContext<'_>,
            _annotated: &mut RgbImage,
        ) -> Result<Option<PluginOutput>, PluginError> {
            Ok(Some(PluginOutput::from_parts("oops", vec![1, 2])))
        }
    }

    struct SkipCounter(&'static AtomicUsize);

    impl Plugin for SkipCounter {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("Skip counter").requires_keypoints()
        }

        fn run(
            &mut self,
            _ctx: &FrameContext<'_>,
            _annotated: &mut RgbImage,
        ) -> Result<Option<PluginOutput>, PluginError> {
            Ok(None)
        }

        fn skipped(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn factories() -> Vec<PluginFactory> {
        vec![
            PluginFactory::new("alpha", || Ok(Box::new(Echo("alpha says hi")))),
            PluginFactory::new("broken_load", || Err(PluginError::Failed("missing model".into()))),
            PluginFactory::new("panicky_load", || panic!("constructor bug")),
            PluginFactory::new("panics", || Ok(Box::new(Panics))),
            PluginFactory::new("hands", || Ok(Box::new(NeedsHands))),
            PluginFactory::new("bad_color", || Ok(Box::new(BadColor))),
            PluginFactory::new("omega", || Ok(Box::new(Echo("omega says hi")))),
            PluginFactory::new("alpha", || Ok(Box::new(Echo("shadowed")))),
        ]
    }

    fn context(frame: &RgbImage) -> FrameContext<'_> {
        FrameContext {
            frame,
            keypoints: None,
            hands: None,
            frame_number: 1,
        }
    }

    #[test]
    fn discovery_skips_units_that_fail_to_load() {
        let registry = PluginRegistry::discover(&factories());
        let ids: Vec<_> = registry.descriptors().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["alpha", "panics", "hands", "bad_color", "omega"]);
        assert!(registry.enabled_ids().is_empty());
        assert!(!registry.contains("broken_load"));
    }

    #[test]
    fn enable_is_idempotent_and_unknown_ids_fail() {
        let registry = PluginRegistry::discover(&factories());
        registry.enable("omega").unwrap();
        registry.enable("omega").unwrap();
        assert_eq!(registry.enabled_ids(), vec!["omega"]);

        assert!(matches!(
            registry.enable("ghost"),
            Err(PipelineError::UnknownPlugin(id)) if id == "ghost"
        ));
        assert!(registry.toggle("ghost").is_err());
        assert!(registry.disable("ghost").is_err());
        assert_eq!(registry.enabled_ids(), vec!["omega"]);
    }

    #[test]
    fn toggle_twice_restores_the_flag() {
        let registry = PluginRegistry::discover(&factories());
        assert!(registry.toggle("alpha").unwrap());
        assert!(!registry.toggle("alpha").unwrap());
        assert_eq!(registry.is_enabled("alpha"), Some(false));

        registry.enable("hands").unwrap();
        assert!(!registry.toggle("hands").unwrap());
        assert!(registry.toggle("hands").unwrap());
        assert_eq!(registry.is_enabled("hands"), Some(true));
    }

    #[test]
    fn set_all_reports_count() {
        let registry = PluginRegistry::discover(&factories());
        assert_eq!(registry.set_all(true), 5);
        assert!(registry.descriptors().iter().all(|d| d.enabled));
        assert_eq!(registry.set_all(false), 5);
        assert!(registry.enabled_ids().is_empty());
    }

    #[test]
    fn run_all_orders_results_and_contains_failures() {
        let registry = PluginRegistry::discover(&factories());
        registry.set_all(true);
        let frame = RgbImage::new(4, 4);
        let mut annotated = frame.clone();

        let report = registry.run_all(&context(&frame), &mut annotated);
        let messages: Vec<_> = report.alerts.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(messages, vec!["alpha says hi", "omega says hi"]);
        assert_eq!(report.failed, vec!["panics"]);
        assert_eq!(report.skipped, vec!["hands"]);
        assert_eq!(report.discarded, vec!["bad_color"]);
        assert_eq!(report.enabled.len(), 5);

        // A panicking plugin stays registered and runs again next cycle.
        let again = registry.run_all(&context(&frame), &mut annotated);
        assert_eq!(again.failed, vec!["panics"]);
    }

    #[test]
    fn legacy_gating_runs_plugins_without_inputs() {
        let registry = PluginRegistry::discover(&factories()).with_gating(PluginGating::Legacy);
        registry.enable("hands").unwrap();
        let frame = RgbImage::new(4, 4);
        let mut annotated = frame.clone();

        let report = registry.run_all(&context(&frame), &mut annotated);
        assert!(report.skipped.is_empty());
        assert_eq!(report.failed, vec!["hands"]);
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn gated_plugins_get_the_skip_hook() {
        static SKIPS: AtomicUsize = AtomicUsize::new(0);
        let registry = PluginRegistry::discover(&[PluginFactory::new("pose_only", || {
            Ok(Box::new(SkipCounter(&SKIPS)))
        })]);
        registry.enable("pose_only").unwrap();
        let frame = RgbImage::new(4, 4);
        let mut annotated = frame.clone();

        let report = registry.run_all(&context(&frame), &mut annotated);
        assert_eq!(report.skipped, vec!["pose_only"]);
        assert_eq!(SKIPS.load(Ordering::SeqCst), 1);

        let person = fixtures::standing();
        let ctx = FrameContext {
            keypoints: Some(&person),
            ..context(&frame)
        };
        let report = registry.run_all(&ctx, &mut annotated);
        assert!(report.skipped.is_empty());
        assert_eq!(SKIPS.load(Ordering::SeqCst), 1);
    }

    fn wrist_at(x: f32) -> KeypointSet {
        fixtures::with_joint(fixtures::standing(), joint::LEFT_WRIST, x, 150.0)
    }

    fn wave_alerts(registry: &PluginRegistry, person: Option<&KeypointSet>) -> usize {
        let frame = RgbImage::new(400, 600);
        let mut annotated = frame.clone();
        let ctx = FrameContext {
            frame: &frame,
            keypoints: person,
            hands: None,
            frame_number: 1,
        };
        registry.run_all(&ctx, &mut annotated).alerts.len()
    }

    #[test]
    fn wave_history_does_not_survive_an_absence() {
        let registry = PluginRegistry::discover(&builtin::catalog());
        registry.enable("waving").unwrap();

        // Control: four consecutive frames form a wave.
        let swings = [300.0, 340.0, 300.0, 340.0];
        let alerts: usize = swings
            .iter()
            .map(|&x| wave_alerts(&registry, Some(&wrist_at(x))))
            .sum();
        assert_eq!(alerts, 1);

        for _ in 0..10 {
            wave_alerts(&registry, None);
        }

        // The same swings split by a gap without a person are not a wave.
        let mut alerts = 0;
        for &x in &swings[..2] {
            alerts += wave_alerts(&registry, Some(&wrist_at(x)));
        }
        for _ in 0..500 {
            alerts += wave_alerts(&registry, None);
        }
        for &x in &swings[2..] {
            alerts += wave_alerts(&registry, Some(&wrist_at(x)));
        }
        assert_eq!(alerts, 0);
    }
}
