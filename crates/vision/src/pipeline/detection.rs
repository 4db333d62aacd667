//! The producer: one thread turning camera frames into published cycle outputs.
//!
//! Each cycle runs acquire, infer, dispatch, annotate and publish, then paces
//! itself to the configured frame interval. The running flag is checked once
//! per cycle boundary, so shutdown takes effect within one cycle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use image::{RgbImage, imageops};
use ml_core::ComputeDevice;
use tracing::{debug, info, warn};
use video_ingest::FrameSource;

use crate::{
    annotation,
    data::{FrameCycleOutput, SystemStatusSnapshot},
    error::PipelineError,
    inference::InferenceAdapter,
    pipeline::watchdog::{DISCONNECT_THRESHOLD, HealthComponent, PipelineHealth},
    plugins::{FrameContext, PluginRegistry},
    publisher::StatePublisher,
};

/// Cooperative shutdown flag shared by the loop, the server and signal handlers.
#[derive(Debug)]
pub struct PipelineControl {
    running: AtomicBool,
}

impl Default for PipelineControl {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineControl {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clear the running flag. Returns `true` only for the call that stopped it.
    pub fn request_shutdown(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }
}

/// State shared between the detection loop and every HTTP worker.
#[derive(Clone)]
pub struct SharedPipeline {
    pub registry: Arc<PluginRegistry>,
    pub publisher: Arc<StatePublisher>,
    pub health: Arc<PipelineHealth>,
    pub control: Arc<PipelineControl>,
}

impl SharedPipeline {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            publisher: Arc::new(StatePublisher::new()),
            health: Arc::new(PipelineHealth::new()),
            control: Arc::new(PipelineControl::new()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub frame_interval: Duration,
    pub acquire_backoff: Duration,
    /// Frames of any other size are scaled to this.
    pub resolution: (u32, u32),
    pub device: ComputeDevice,
    pub verbose: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            acquire_backoff: Duration::from_millis(100),
            resolution: (1024, 768),
            device: ComputeDevice::Cpu,
            verbose: false,
        }
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new output was published with this frame number.
    Published(u64),
    /// Acquisition failed transiently; nothing was published.
    NoFrame,
    /// The source will never produce another frame.
    EndOfStream,
}

/// Why [`DetectionLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    EndOfStream,
}

/// Exponential moving average of the cycle rate.
#[derive(Debug, Default)]
struct FpsMeter {
    last: Option<Instant>,
    smoothed: f32,
}

impl FpsMeter {
    fn tick(&mut self) -> f32 {
        let now = Instant::now();
        if let Some(last) = self.last.replace(now) {
            let elapsed = now.duration_since(last).as_secs_f32();
            if elapsed > 0.0 {
                let instant = 1.0 / elapsed;
                self.smoothed = if self.smoothed == 0.0 {
                    instant
                } else {
                    0.9 * self.smoothed + 0.1 * instant
                };
            }
        }
        self.smoothed
    }
}

pub struct DetectionLoop {
    source: Box<dyn FrameSource>,
    adapter: InferenceAdapter,
    shared: SharedPipeline,
    settings: LoopSettings,
    frame_count: u64,
    fps: FpsMeter,
    released: bool,
}

impl DetectionLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        adapter: InferenceAdapter,
        shared: SharedPipeline,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            adapter,
            shared,
            settings,
            frame_count: 0,
            fps: FpsMeter::default(),
            released: false,
        }
    }

    /// Frames acquired so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Cycle until shutdown is requested or the source ends.
    ///
    /// Resources are released before returning and the running flag is left
    /// cleared either way.
    pub fn run(mut self) -> LoopExit {
        info!(source = self.source.describe(), "detection loop started");
        let exit = loop {
            if !self.shared.control.is_running() {
                break LoopExit::Shutdown;
            }
            let started = Instant::now();
            match self.run_cycle() {
                CycleOutcome::Published(_) => pace(started, self.settings.frame_interval),
                CycleOutcome::NoFrame => thread::sleep(self.settings.acquire_backoff),
                CycleOutcome::EndOfStream => break LoopExit::EndOfStream,
            }
        };
        self.shared.control.request_shutdown();
        self.release();
        info!(?exit, frames = self.frame_count, "detection loop stopped");
        exit
    }

    /// One acquire, infer, dispatch, annotate and publish pass.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let acquire_start = Instant::now();
        let raw = match self.acquire() {
            Ok(raw) => raw,
            Err(outcome) => return outcome,
        };
        record_stage("acquire", acquire_start);

        self.frame_count += 1;
        let frame_number = self.frame_count;
        let _frame_guard = tracing::info_span!("frame", frame = frame_number).entered();

        let inference_start = Instant::now();
        let inferred = self.adapter.infer(&raw);
        let inference_elapsed = record_stage("inference", inference_start);
        self.shared.health.beat(HealthComponent::Inference);
        if !inferred.failures.is_empty() {
            debug!(
                failed = inferred.failures.len(),
                "publishing partial detections"
            );
        }
        if inference_elapsed > self.settings.frame_interval {
            debug!(
                elapsed_ms = inference_elapsed.as_millis() as u64,
                "inference exceeded the frame interval"
            );
        }

        let dispatch_start = Instant::now();
        let mut annotated = inferred.annotated;
        let ctx = FrameContext {
            frame: &raw,
            keypoints: inferred.keypoints.as_ref(),
            hands: inferred.hands.as_ref(),
            frame_number,
        };
        let report = self.shared.registry.run_all(&ctx, &mut annotated);
        record_stage("dispatch", dispatch_start);

        let annotate_start = Instant::now();
        annotation::draw_loop_overlays(&mut annotated, frame_number, report.enabled.len());
        annotation::draw_alert_panel(&mut annotated, &report.alerts);
        record_stage("annotate", annotate_start);

        let fps = self.fps.tick();
        metrics::gauge!("vision_pipeline_fps").set(fps as f64);

        let (width, height) = (raw.width(), raw.height());
        let status = SystemStatusSnapshot {
            frame_count: frame_number,
            person_detected: inferred.keypoints.is_some(),
            hands_detected: inferred.hands.is_some(),
            device: self.settings.device.label(),
            resolution: format!("{width}x{height}"),
            enabled_plugin_ids: report.enabled.iter().map(|id| id.to_string()).collect(),
            plugins_loaded: report.enabled.len(),
            total_plugin_count: self.shared.registry.len(),
            fps,
            alert_count: report.alerts.len(),
            model_loaded: self.adapter.model_loaded(),
        };

        if self.settings.verbose {
            debug!(
                person = status.person_detected,
                hands = status.hands_detected,
                alerts = status.alert_count,
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "cycle complete"
            );
        }

        let publish_start = Instant::now();
        self.shared
            .publisher
            .publish(FrameCycleOutput::new(annotated, report.alerts, status));
        self.shared.health.beat(HealthComponent::Publish);
        record_stage("publish", publish_start);

        CycleOutcome::Published(frame_number)
    }

    fn acquire(&mut self) -> Result<RgbImage, CycleOutcome> {
        let health = &self.shared.health;
        let failure = match self.source.next_frame() {
            Ok(frame) => match frame.into_rgb_image() {
                Ok(image) => {
                    health.beat(HealthComponent::Acquire);
                    if health.record_acquire_success() {
                        info!(source = self.source.describe(), "camera reconnected");
                    }
                    return Ok(self.fit_resolution(image));
                }
                Err(err) => err,
            },
            Err(err) if !err.is_transient() => {
                info!(source = self.source.describe(), "video source reached end of stream");
                return Err(CycleOutcome::EndOfStream);
            }
            Err(err) => err,
        };
        let failure = PipelineError::SourceUnavailable(failure);

        metrics::counter!("vision_capture_failures_total").increment(1);
        let streak = health.record_acquire_failure();
        if streak == DISCONNECT_THRESHOLD {
            warn!(source = self.source.describe(), "camera disconnected: {failure}");
        } else {
            debug!(source = self.source.describe(), attempt = streak, "no frame: {failure}");
        }
        Err(CycleOutcome::NoFrame)
    }

    fn fit_resolution(&self, image: RgbImage) -> RgbImage {
        let (width, height) = self.settings.resolution;
        if image.dimensions() == (width, height) {
            image
        } else {
            imageops::resize(&image, width, height, imageops::FilterType::Triangle)
        }
    }

    /// Release the camera and detectors. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.source.release();
        self.adapter.close();
        info!(source = self.source.describe(), "camera released");
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.release();
    }
}

fn record_stage(stage: &'static str, started: Instant) -> Duration {
    let elapsed = started.elapsed();
    metrics::histogram!("vision_stage_latency_seconds", "stage" => stage).record(elapsed.as_secs_f64());
    elapsed
}

/// Sleep off whatever remains of the frame interval.
fn pace(started: Instant, interval: Duration) {
    if let Some(remaining) = interval.checked_sub(started.elapsed()) {
        thread::sleep(remaining);
    }
}
