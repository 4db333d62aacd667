//! Liveness tracking for the detection loop.
//!
//! The loop beats once per stage per cycle and records acquisition failures.
//! A watchdog thread compares heartbeats against a staleness threshold and
//! reports stalled stages through status. It never restarts anything: a
//! stalled camera is surfaced to viewers, not treated as a crash.

use std::{
    io,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use tracing::{error, info};

use crate::pipeline::{detection::PipelineControl, telemetry};

/// Sleep interval between watchdog health checks.
pub(crate) const WATCHDOG_POLL_INTERVAL_MS: u64 = 500;
/// Time without a heartbeat before a stage is considered stalled.
pub(crate) const WATCHDOG_STALE_THRESHOLD_MS: u64 = 3_000;
/// Grace period at startup allowing the camera and models to warm up.
pub(crate) const WATCHDOG_STARTUP_GRACE_MS: u64 = 5_000;
/// Consecutive failed acquisitions before the camera is reported disconnected.
pub const DISCONNECT_THRESHOLD: u32 = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HealthComponent {
    Acquire,
    Inference,
    Publish,
}

impl HealthComponent {
    pub fn label(self) -> &'static str {
        match self {
            HealthComponent::Acquire => "acquire",
            HealthComponent::Inference => "inference",
            HealthComponent::Publish => "publish",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraState {
    Connected,
    Disconnected,
}

pub struct PipelineHealth {
    acquire: AtomicU64,
    inference: AtomicU64,
    publish: AtomicU64,
    consecutive_failures: AtomicU32,
    stalled: Mutex<Option<HealthComponent>>,
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineHealth {
    /// Heartbeats start in the future so nothing is stale during warm-up.
    pub fn new() -> Self {
        let grace_deadline = current_millis().saturating_add(WATCHDOG_STARTUP_GRACE_MS);
        Self {
            acquire: AtomicU64::new(grace_deadline),
            inference: AtomicU64::new(grace_deadline),
            publish: AtomicU64::new(grace_deadline),
            consecutive_failures: AtomicU32::new(0),
            stalled: Mutex::new(None),
        }
    }

    pub fn beat(&self, component: HealthComponent) {
        let now = current_millis();
        let slot = match component {
            HealthComponent::Acquire => &self.acquire,
            HealthComponent::Inference => &self.inference,
            HealthComponent::Publish => &self.publish,
        };
        // fetch_max keeps the warm-up deadline until it has passed.
        slot.fetch_max(now, Ordering::Relaxed);
    }

    /// Count a failed acquisition; returns the current streak length.
    pub fn record_acquire_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Reset the failure streak; returns whether the camera was disconnected.
    pub fn record_acquire_success(&self) -> bool {
        self.consecutive_failures.swap(0, Ordering::AcqRel) >= DISCONNECT_THRESHOLD
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn camera_state(&self) -> CameraState {
        if self.consecutive_failures() >= DISCONNECT_THRESHOLD {
            CameraState::Disconnected
        } else {
            CameraState::Connected
        }
    }

    /// First stage, in pipeline order, without a recent heartbeat.
    pub fn stale_component(&self, now: u64) -> Option<HealthComponent> {
        [
            (HealthComponent::Acquire, &self.acquire),
            (HealthComponent::Inference, &self.inference),
            (HealthComponent::Publish, &self.publish),
        ]
        .into_iter()
        .find(|(_, beat)| now.saturating_sub(beat.load(Ordering::Relaxed)) > WATCHDOG_STALE_THRESHOLD_MS)
        .map(|(component, _)| component)
    }

    /// Store the watchdog's verdict; returns whether it changed.
    pub(crate) fn set_stalled(&self, component: Option<HealthComponent>) -> bool {
        let mut guard = self.stalled.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = *guard != component;
        *guard = component;
        changed
    }

    pub fn stalled(&self) -> Option<HealthComponent> {
        *self.stalled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `ok`, or `stalled:<stage>`.
    pub fn pipeline_state(&self) -> String {
        match self.stalled() {
            Some(component) => format!("stalled:{}", component.label()),
            None => "ok".to_string(),
        }
    }
}

/// Spawn the thread that polls heartbeats until the pipeline stops.
pub(crate) fn spawn_watchdog(
    health: Arc<PipelineHealth>,
    control: Arc<PipelineControl>,
) -> io::Result<thread::JoinHandle<()>> {
    telemetry::spawn_thread("vision-watchdog", move || {
        while control.is_running() {
            thread::sleep(Duration::from_millis(WATCHDOG_POLL_INTERVAL_MS));
            let stale = health.stale_component(current_millis());
            if health.set_stalled(stale) {
                match stale {
                    Some(component) => error!("watchdog detected stalled {} stage", component.label()),
                    None => info!("pipeline heartbeats recovered"),
                }
            }
        }
    })
}

pub(crate) fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_is_stale_during_grace() {
        let health = PipelineHealth::new();
        assert_eq!(health.stale_component(current_millis()), None);
    }

    #[test]
    fn stale_stage_is_reported_in_pipeline_order() {
        let health = PipelineHealth::new();
        let later = current_millis() + WATCHDOG_STARTUP_GRACE_MS + WATCHDOG_STALE_THRESHOLD_MS + 1;
        assert_eq!(health.stale_component(later), Some(HealthComponent::Acquire));

        health.set_stalled(Some(HealthComponent::Acquire));
        assert_eq!(health.pipeline_state(), "stalled:acquire");
        assert!(!health.set_stalled(Some(HealthComponent::Acquire)));
        assert!(health.set_stalled(None));
        assert_eq!(health.pipeline_state(), "ok");
    }

    #[test]
    fn camera_disconnects_after_threshold() {
        let health = PipelineHealth::new();
        assert_eq!(health.record_acquire_failure(), 1);
        assert_eq!(health.record_acquire_failure(), 2);
        assert_eq!(health.camera_state(), CameraState::Connected);
        assert_eq!(health.record_acquire_failure(), 3);
        assert_eq!(health.camera_state(), CameraState::Disconnected);

        assert!(health.record_acquire_success());
        assert_eq!(health.camera_state(), CameraState::Connected);
        assert!(!health.record_acquire_success());
    }
}
