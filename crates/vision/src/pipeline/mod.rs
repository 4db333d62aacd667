//! Pipeline supervisor wiring the camera, detectors, plugin registry, the
//! detection loop thread, the watchdog and the HTTP server.

pub mod config;
pub mod detection;
pub(crate) mod telemetry;
pub mod watchdog;

use std::sync::{Arc, Mutex, Once, PoisonError};

use anyhow::{Context, Result, anyhow};
use ml_core::{ComputeDevice, DisabledDetector, HandLandmarker, PoseEstimator};
use tracing::{error, info, warn};

use crate::{
    inference::InferenceAdapter,
    pipeline::{
        config::PipelineConfig,
        detection::{DetectionLoop, LoopSettings, PipelineControl, SharedPipeline},
    },
    plugins::{PluginRegistry, builtin},
    server::{self, ServerState, StopSignal},
};

/// Detector input sizes used by the TorchScript backends.
#[cfg(feature = "with-tch")]
const POSE_INPUT_SIZE: (u32, u32) = (640, 640);
#[cfg(feature = "with-tch")]
const HAND_INPUT_SIZE: (u32, u32) = (224, 224);

/// Run the pipeline until Ctrl+C, or until the source ends and the server is
/// stopped.
///
/// `POST /shutdown` stops the detection loop only; the HTTP server keeps
/// answering with a stopped state until the process is interrupted.
pub fn run(config: PipelineConfig) -> Result<()> {
    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);
    if let Err(err) = telemetry::init_metrics_recorder() {
        warn!("metrics disabled: {err:#}");
    }

    let device = ComputeDevice::detect(config.use_cpu);
    let pipeline_span = tracing::info_span!(
        "vision.pipeline",
        source = %config.source,
        width = config.width,
        height = config.height,
        device = device.label(),
    );
    let _pipeline_guard = pipeline_span.enter();

    let source = video_ingest::open_source(&config.source, config.resolution())
        .with_context(|| format!("failed to open video source {}", config.source))?;
    let adapter = build_adapter(&config, device)?;

    let registry = PluginRegistry::discover(&builtin::catalog()).with_gating(config.gating);
    for id in &config.enabled_plugins {
        if let Err(err) = registry.enable(id) {
            warn!("ignoring startup plugin: {err}");
        }
    }
    info!(
        total = registry.len(),
        enabled = ?registry.enabled_ids(),
        gating = ?registry.gating(),
        "plugins ready"
    );

    let shared = SharedPipeline::new(registry);
    let server = server::spawn_api_server(ServerState::new(shared.clone(), &config), config.bind)?;
    install_ctrlc_handler(shared.control.clone(), server.stop_signal());

    let watchdog = watchdog::spawn_watchdog(shared.health.clone(), shared.control.clone())
        .context("failed to spawn watchdog thread")?;

    let settings = LoopSettings {
        frame_interval: config.frame_interval,
        acquire_backoff: config.acquire_backoff,
        resolution: config.resolution(),
        device,
        verbose: config.verbose,
    };
    let detection = DetectionLoop::new(source, adapter, shared.clone(), settings);
    let producer = telemetry::spawn_thread("vision-detection", move || detection.run())
        .context("failed to spawn detection thread")?;

    println!("Viewer available at http://{}/", config.bind);
    println!("Press Ctrl+C to stop");

    let exit = producer
        .join()
        .map_err(|_| anyhow!("detection thread panicked"))?;
    info!(?exit, "detection loop finished");

    if watchdog.join().is_err() {
        error!("watchdog thread panicked");
    }
    // Keep serving the stopped state until Ctrl+C stops the server.
    server.join();
    Ok(())
}

fn build_adapter(config: &PipelineConfig, device: ComputeDevice) -> Result<InferenceAdapter> {
    let pose = build_pose(config, device)?;
    let hands = build_hands(config, device)?;
    let adapter = InferenceAdapter::new(pose, hands);
    if !adapter.model_loaded() {
        warn!("no pose model loaded; frames are streamed without detections");
    }
    Ok(adapter)
}

#[cfg(feature = "with-tch")]
fn build_pose(config: &PipelineConfig, device: ComputeDevice) -> Result<Box<dyn PoseEstimator>> {
    match &config.pose_model {
        Some(path) => {
            let model = ml_core::pose::TorchPoseEstimator::new(path, device.to_tch(), POSE_INPUT_SIZE)
                .with_context(|| format!("failed to load pose model {}", path.display()))?;
            info!(model = %path.display(), "pose model loaded");
            Ok(Box::new(model))
        }
        None => Ok(Box::new(DisabledDetector::new("pose"))),
    }
}

#[cfg(feature = "with-tch")]
fn build_hands(config: &PipelineConfig, device: ComputeDevice) -> Result<Box<dyn HandLandmarker>> {
    match &config.hand_model {
        Some(path) => {
            let model = ml_core::hands::TorchHandLandmarker::new(path, device.to_tch(), HAND_INPUT_SIZE)
                .with_context(|| format!("failed to load hand model {}", path.display()))?;
            info!(model = %path.display(), "hand model loaded");
            Ok(Box::new(model))
        }
        None => Ok(Box::new(DisabledDetector::new("hands"))),
    }
}

#[cfg(not(feature = "with-tch"))]
fn build_pose(config: &PipelineConfig, _device: ComputeDevice) -> Result<Box<dyn PoseEstimator>> {
    if let Some(path) = &config.pose_model {
        warn!(model = %path.display(), "built without `with-tch`; pose model ignored");
    }
    Ok(Box::new(DisabledDetector::new("pose")))
}

#[cfg(not(feature = "with-tch"))]
fn build_hands(config: &PipelineConfig, _device: ComputeDevice) -> Result<Box<dyn HandLandmarker>> {
    if let Some(path) = &config.hand_model {
        warn!(model = %path.display(), "built without `with-tch`; hand model ignored");
    }
    Ok(Box::new(DisabledDetector::new("hands")))
}

/// Ctrl+C stops the detection loop and then the HTTP server.
///
/// The process-wide handler is installed once; later pipelines in the same
/// process retarget it.
fn install_ctrlc_handler(control: Arc<PipelineControl>, stop: StopSignal) {
    static CTRL_HANDLER: Once = Once::new();
    static TARGET: Mutex<Option<(Arc<PipelineControl>, StopSignal)>> = Mutex::new(None);

    *TARGET.lock().unwrap_or_else(PoisonError::into_inner) = Some((control, stop));
    CTRL_HANDLER.call_once(|| {
        let installed = ctrlc::set_handler(|| {
            let target = TARGET.lock().unwrap_or_else(PoisonError::into_inner).clone();
            if let Some((control, stop)) = target {
                if control.request_shutdown() {
                    info!("Ctrl+C received; shutting down");
                }
                stop.trigger();
            }
        });
        if let Err(err) = installed {
            warn!("failed to install Ctrl+C handler: {err}");
        }
    });
}
