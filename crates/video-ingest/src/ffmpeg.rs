use std::{
    io::{ErrorKind, Read},
    process::{Child, Command, Stdio},
    thread,
};

use anyhow::{Result, anyhow};
use chrono::Utc;
use crossbeam_channel::{Sender, bounded};
use tracing::debug;

use crate::{
    source::FrameReceiver,
    types::{CaptureError, Frame, FrameFormat},
};

/// Spawns an FFmpeg process reading a V4L2 device and yields BGR8 frames
/// scaled to `target_size`.
pub fn spawn_v4l2_reader(device: &str, target_size: (u32, u32)) -> Result<FrameReceiver> {
    let mut cmd = base_command();
    cmd.arg("-f")
        .arg("video4linux2")
        .arg("-video_size")
        .arg(format!("{}x{}", target_size.0, target_size.1))
        .arg("-i")
        .arg(device);
    push_output_args(&mut cmd, target_size);
    spawn_ffmpeg_reader(cmd, target_size, 2)
}

/// Spawns an FFmpeg process pulling an RTSP feed over TCP with low-latency
/// flags.
pub fn spawn_rtsp_reader(uri: &str, target_size: (u32, u32)) -> Result<FrameReceiver> {
    let mut cmd = base_command();
    cmd.arg("-rtsp_transport")
        .arg("tcp")
        .arg("-fflags")
        .arg("nobuffer")
        .arg("-flags")
        .arg("low_delay")
        .arg("-max_delay")
        .arg("0")
        .arg("-i")
        .arg(uri);
    push_output_args(&mut cmd, target_size);
    spawn_ffmpeg_reader(cmd, target_size, 4)
}

/// Spawns an FFmpeg process decoding a video file at its native frame rate.
/// The receiver reports `EndOfStream` once the file is exhausted.
pub fn spawn_file_reader(path: &str, target_size: (u32, u32)) -> Result<FrameReceiver> {
    let mut cmd = base_command();
    cmd.arg("-re").arg("-i").arg(path);
    push_output_args(&mut cmd, target_size);
    spawn_ffmpeg_reader(cmd, target_size, 4)
}

fn base_command() -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner").arg("-loglevel").arg("error");
    cmd
}

fn push_output_args(cmd: &mut Command, target_size: (u32, u32)) {
    cmd.arg("-an")
        .arg("-vf")
        .arg(format!("scale={}:{}", target_size.0, target_size.1))
        .arg("-pix_fmt")
        .arg("bgr24")
        .arg("-f")
        .arg("rawvideo")
        .arg("-");
}

fn spawn_ffmpeg_reader(
    mut cmd: Command,
    target_size: (u32, u32),
    queue_size: usize,
) -> Result<FrameReceiver> {
    let (tx, rx) = bounded(queue_size);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|err| CaptureError::Other(err.into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")))?;

    thread::Builder::new()
        .name("video-ingest-ffmpeg".into())
        .spawn(move || {
            if let Err(err) = ffmpeg_loop(stdout, child, target_size, tx.clone()) {
                let _ = tx.send(Err(err));
            }
        })
        .map_err(|err| CaptureError::Other(err.into()))?;

    Ok(rx)
}

fn ffmpeg_loop(
    mut stdout: impl Read,
    mut child: Child,
    target_size: (u32, u32),
    tx: Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let frame_bytes = (target_size.0 as usize) * (target_size.1 as usize) * 3;
    let mut buffer = vec![0u8; frame_bytes];
    let mut result = Ok(());

    loop {
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let timestamp_ms = Utc::now().timestamp_millis();
                if tx
                    .send(Ok(Frame {
                        data: buffer.clone(),
                        width: target_size.0,
                        height: target_size.1,
                        timestamp_ms,
                        format: FrameFormat::Bgr8,
                    }))
                    .is_err()
                {
                    debug!("frame receiver dropped; stopping ffmpeg reader");
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                result = Err(CaptureError::EndOfStream);
                break;
            }
            Err(err) => {
                result = Err(CaptureError::Other(err.into()));
                break;
            }
        }
    }

    let _ = child.kill();
    let _ = child.wait();
    result
}
