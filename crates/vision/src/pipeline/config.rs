//! Configuration parsing for the pose pipeline.
//!
//! CLI arguments are translated once into a [`PipelineConfig`]; the loop,
//! server and telemetry read it without re-parsing flags.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::plugins::{PluginGating, builtin::DEFAULT_ENABLED};

#[derive(Clone, Debug)]
/// Canonical configuration shared by every stage in the pipeline.
pub struct PipelineConfig {
    /// Camera index, device path, RTSP URI or video file.
    pub source: String,
    /// Fixed pipeline resolution.
    pub width: u32,
    pub height: u32,
    pub pose_model: Option<PathBuf>,
    pub hand_model: Option<PathBuf>,
    /// Force CPU inference.
    pub use_cpu: bool,
    pub bind: SocketAddr,
    pub jpeg_quality: u8,
    /// Target cycle interval for the producer and the MJPEG stream.
    pub frame_interval: Duration,
    /// Sleep after a failed acquisition.
    pub acquire_backoff: Duration,
    /// Plugin ids enabled right after discovery.
    pub enabled_plugins: Vec<String>,
    pub gating: PluginGating,
    /// Directory screenshots are written to.
    pub capture_dir: PathBuf,
    pub verbose: bool,
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Default log level `debug` instead of `info` when `RUST_LOG` is unset.
    pub verbose: bool,
}

/// CLI arguments accepted by the `run` subcommand.
#[derive(Debug, Args)]
pub struct PipelineCliArgs {
    /// Camera index, `/dev/videoN`, `rtsp://...` or a video file.
    #[arg(value_name = "SOURCE")]
    pub source: Option<String>,
    /// Source flag (overrides positional).
    #[arg(long = "source", value_name = "URI")]
    pub source_flag: Option<String>,
    /// Pipeline width in pixels.
    #[arg(long, value_name = "PX", default_value_t = 1024)]
    pub width: u32,
    /// Pipeline height in pixels.
    #[arg(long, value_name = "PX", default_value_t = 768)]
    pub height: u32,
    /// TorchScript pose model (requires the `with-tch` feature).
    #[arg(long = "pose-model", value_name = "PATH")]
    pub pose_model: Option<PathBuf>,
    /// TorchScript hand-landmark model (requires the `with-tch` feature).
    #[arg(long = "hand-model", value_name = "PATH")]
    pub hand_model: Option<PathBuf>,
    /// Force CPU inference.
    #[arg(long = "cpu", action = clap::ArgAction::SetTrue)]
    pub use_cpu: bool,
    /// HTTP listen address.
    #[arg(long, value_name = "ADDR", default_value = "0.0.0.0:5000")]
    pub bind: String,
    /// JPEG quality used for the stream and captures (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85)]
    pub jpeg_quality: u32,
    /// Target interval between cycles.
    #[arg(long = "frame-interval-ms", value_name = "MS", default_value_t = 33)]
    pub frame_interval_ms: u64,
    /// Sleep after a failed frame acquisition.
    #[arg(long = "acquire-backoff-ms", value_name = "MS", default_value_t = 100)]
    pub acquire_backoff_ms: u64,
    /// Plugin to enable at startup; repeatable. Replaces the defaults.
    #[arg(long = "enable", value_name = "ID")]
    pub enable: Vec<String>,
    /// Start with every plugin disabled.
    #[arg(long = "no-default-plugins", action = clap::ArgAction::SetTrue)]
    pub no_default_plugins: bool,
    /// Run plugins even when their required inputs are missing.
    #[arg(long = "legacy-plugin-gating", action = clap::ArgAction::SetTrue)]
    pub legacy_plugin_gating: bool,
    /// Directory where `/capture` writes screenshots.
    #[arg(long = "capture-dir", value_name = "DIR", default_value = ".")]
    pub capture_dir: PathBuf,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Per-cycle debug logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

impl TryFrom<PipelineCliArgs> for PipelineConfig {
    type Error = anyhow::Error;

    fn try_from(args: PipelineCliArgs) -> Result<Self> {
        let source = args
            .source_flag
            .or(args.source)
            .unwrap_or_else(|| "0".to_string());

        if args.width == 0 || args.height == 0 {
            bail!("--width and --height must be positive integers");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.frame_interval_ms == 0 {
            bail!("--frame-interval-ms must be at least 1");
        }

        let bind = args
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid --bind address {}", args.bind))?;

        let enabled_plugins = if args.no_default_plugins {
            if !args.enable.is_empty() {
                bail!("--enable and --no-default-plugins are mutually exclusive");
            }
            Vec::new()
        } else if args.enable.is_empty() {
            DEFAULT_ENABLED.iter().map(|id| id.to_string()).collect()
        } else {
            args.enable
        };

        let gating = if args.legacy_plugin_gating {
            PluginGating::Legacy
        } else {
            PluginGating::RequireInputs
        };

        Ok(Self {
            source,
            width: args.width,
            height: args.height,
            pose_model: args.pose_model,
            hand_model: args.hand_model,
            use_cpu: args.use_cpu,
            bind,
            jpeg_quality: args.jpeg_quality as u8,
            frame_interval: Duration::from_millis(args.frame_interval_ms),
            acquire_backoff: Duration::from_millis(args.acquire_backoff_ms),
            enabled_plugins,
            gating,
            capture_dir: args.capture_dir,
            verbose: args.verbose,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
                verbose: args.verbose,
            },
        })
    }
}

impl PipelineConfig {
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: PipelineCliArgs,
    }

    fn parse(argv: &[&str]) -> Result<PipelineConfig> {
        let harness = Harness::try_parse_from(std::iter::once("posewatch").chain(argv.iter().copied()))?;
        PipelineConfig::try_from(harness.args)
    }

    #[test]
    fn defaults_match_reference_setup() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.source, "0");
        assert_eq!(config.resolution(), (1024, 768));
        assert_eq!(config.bind.port(), 5000);
        assert_eq!(config.jpeg_quality, 85);
        assert_eq!(config.frame_interval, Duration::from_millis(33));
        assert_eq!(config.enabled_plugins, ["finger_count", "raise"]);
        assert_eq!(config.gating, PluginGating::RequireInputs);
    }

    #[test]
    fn source_flag_overrides_positional() {
        let config = parse(&["1", "--source", "rtsp://cam/live"]).unwrap();
        assert_eq!(config.source, "rtsp://cam/live");
    }

    #[test]
    fn explicit_plugins_replace_defaults() {
        let config = parse(&["--enable", "waving", "--enable", "posture", "--legacy-plugin-gating"]).unwrap();
        assert_eq!(config.enabled_plugins, ["waving", "posture"]);
        assert_eq!(config.gating, PluginGating::Legacy);
        assert!(parse(&["--no-default-plugins"]).unwrap().enabled_plugins.is_empty());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--jpeg-quality", "0"]).is_err());
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--frame-interval-ms", "0"]).is_err());
        assert!(parse(&["--bind", "not-an-address"]).is_err());
        assert!(parse(&["--no-default-plugins", "--enable", "raise"]).is_err());
    }
}
