//! Real-time pose pipeline: plugin orchestration, the detection loop, state
//! publication and the HTTP preview server.

pub mod annotation;
pub mod data;
pub mod encoding;
pub mod error;
mod html;
pub mod inference;
pub mod pipeline;
pub mod plugins;
pub mod publisher;
mod server;

pub use data::{AlertColor, FrameCycleOutput, PluginAlert, SystemStatusSnapshot};
pub use error::PipelineError;
pub use inference::{InferenceAdapter, InferenceOutput};
pub use pipeline::{
    config::{PipelineCliArgs, PipelineConfig, TelemetryOptions},
    detection::{CycleOutcome, DetectionLoop, LoopExit, LoopSettings, PipelineControl, SharedPipeline},
    run,
    watchdog::{CameraState, HealthComponent, PipelineHealth},
};
pub use plugins::{
    DispatchReport, FrameContext, Plugin, PluginDescriptor, PluginError, PluginFactory, PluginGating,
    PluginMetadata, PluginOutput, PluginRegistry,
};
pub use publisher::StatePublisher;
pub use server::{ApiServer, StopSignal};
