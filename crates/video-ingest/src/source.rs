//! Pull-based frame sources consumed by the detection loop.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use crate::types::{CaptureError, Frame};

/// Receiver half handed out by the background capture readers.
pub type FrameReceiver = Receiver<Result<Frame, CaptureError>>;

type Reopen = Box<dyn FnMut() -> anyhow::Result<FrameReceiver> + Send>;

/// A camera or video the pipeline can pull frames from.
pub trait FrameSource: Send {
    /// Human readable description used in logs.
    fn describe(&self) -> &str;

    /// Block until the next frame is ready.
    ///
    /// `CaptureError::Unavailable` (and any other transient error) means the
    /// caller should back off and try again; `CaptureError::EndOfStream` means
    /// the source will never produce another frame.
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Release the underlying device. Further reads report end of stream.
    fn release(&mut self);
}

/// Adapts one of the channel-based background readers into a [`FrameSource`].
///
/// Live sources carry a reopen hook: when the reader thread dies the source
/// reports `Unavailable` and respawns the reader on the next read instead of
/// ending the stream.
pub struct ChannelSource {
    uri: String,
    rx: Option<FrameReceiver>,
    wait: Duration,
    reopen: Option<Reopen>,
    released: bool,
}

impl ChannelSource {
    pub fn new(uri: impl Into<String>, rx: FrameReceiver, wait: Duration) -> Self {
        Self {
            uri: uri.into(),
            rx: Some(rx),
            wait,
            reopen: None,
            released: false,
        }
    }

    /// Respawn the reader with `reopen` whenever the channel disconnects.
    pub fn with_reopen(
        mut self,
        reopen: impl FnMut() -> anyhow::Result<FrameReceiver> + Send + 'static,
    ) -> Self {
        self.reopen = Some(Box::new(reopen));
        self
    }
}

impl FrameSource for ChannelSource {
    fn describe(&self) -> &str {
        &self.uri
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.released {
            return Err(CaptureError::EndOfStream);
        }

        let Some(rx) = self.rx.as_ref() else {
            let Some(reopen) = self.reopen.as_mut() else {
                return Err(CaptureError::EndOfStream);
            };
            return match reopen() {
                Ok(rx) => {
                    debug!(source = %self.uri, "video reader respawned");
                    self.rx = Some(rx);
                    Err(CaptureError::Unavailable)
                }
                Err(err) => {
                    warn!(source = %self.uri, "failed to reopen video source: {err:#}");
                    Err(CaptureError::Open {
                        uri: self.uri.clone(),
                    })
                }
            };
        };

        match rx.recv_timeout(self.wait) {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(CaptureError::EndOfStream)) => {
                self.rx = None;
                if self.reopen.is_some() {
                    Err(CaptureError::Unavailable)
                } else {
                    Err(CaptureError::EndOfStream)
                }
            }
            Ok(Err(err)) => Err(err),
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Unavailable),
            Err(RecvTimeoutError::Disconnected) => {
                self.rx = None;
                if self.reopen.is_some() {
                    Err(CaptureError::Unavailable)
                } else {
                    Err(CaptureError::EndOfStream)
                }
            }
        }
    }

    fn release(&mut self) {
        self.released = true;
        self.reopen = None;
        // Dropping the receiver makes the reader's next send fail, which ends
        // the reader thread and kills any child process it owns.
        self.rx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameFormat;
    use crossbeam_channel::bounded;

    fn frame() -> Frame {
        Frame {
            data: vec![0; 3],
            width: 1,
            height: 1,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        }
    }

    #[test]
    fn timeout_reports_unavailable() {
        let (_tx, rx) = bounded(1);
        let mut source = ChannelSource::new("test", rx, Duration::from_millis(5));
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::Unavailable)
        ));
    }

    #[test]
    fn disconnect_without_reopen_is_end_of_stream() {
        let (tx, rx) = bounded(1);
        tx.send(Ok(frame())).unwrap();
        drop(tx);
        let mut source = ChannelSource::new("file.mp4", rx, Duration::from_millis(5));
        assert!(source.next_frame().is_ok());
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::EndOfStream)
        ));
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::EndOfStream)
        ));
    }

    #[test]
    fn disconnect_with_reopen_stays_transient() {
        let (tx, rx) = bounded(1);
        drop(tx);
        let mut source = ChannelSource::new("0", rx, Duration::from_millis(5)).with_reopen(|| {
            let (tx, rx) = bounded(1);
            tx.send(Ok(frame())).unwrap();
            Ok(rx)
        });
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::Unavailable)
        ));
        // Reader respawned on this call.
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::Unavailable)
        ));
        assert!(source.next_frame().is_ok());
    }

    #[test]
    fn released_source_never_yields_again() {
        let (tx, rx) = bounded(2);
        tx.send(Ok(frame())).unwrap();
        let mut source = ChannelSource::new("0", rx, Duration::from_millis(5));
        source.release();
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::EndOfStream)
        ));
        assert!(tx.send(Ok(frame())).is_err());
    }
}
