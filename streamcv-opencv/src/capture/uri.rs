//! Video file / network stream capture

use super::{deliver, Delivery};
use crate::backend::{Capture, VisionBackend};
use crate::config::UriCaptureConfig;
use crate::error::CvError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use streamcv_core::{Context, Map, Signal, Source, SourceControl, SourceCreator, Writer};
use tracing::{debug, error, info};

/// Creates [`CaptureFromUri`] sources from host parameters.
pub struct FromUriCreator<B: VisionBackend> {
    backend: Arc<B>,
}

impl<B: VisionBackend> FromUriCreator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

impl<B: VisionBackend> SourceCreator for FromUriCreator<B> {
    fn create_source(&self, _ctx: &Context, params: &Map) -> streamcv_core::Result<Arc<dyn Source>> {
        let config = UriCaptureConfig::from_params(params)?;
        Ok(Arc::new(CaptureFromUri::new(self.backend.clone(), config)))
    }
}

/// How one pass over the URI ended.
enum Pass {
    /// Stopped by the host or the sink.
    Finished,
    /// No more frames could be read.
    Exhausted,
    Rewind,
}

/// Streams frames from a video file or a network stream.
///
/// Running out of frames is an error unless `next_frame_error` is off. A
/// rewindable source that ends cleanly parks until it is rewound or stopped.
pub struct CaptureFromUri<B: VisionBackend> {
    backend: Arc<B>,
    config: UriCaptureConfig,
    control: SourceControl,
    frames: AtomicU64,
}

impl<B: VisionBackend> CaptureFromUri<B> {
    pub fn new(backend: Arc<B>, config: UriCaptureConfig) -> Self {
        Self {
            backend,
            config,
            control: SourceControl::new(),
            frames: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &UriCaptureConfig {
        &self.config
    }

    /// Frames delivered by the current or most recent pass.
    pub fn frames_read(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    fn stream(&self, ctx: &Context, w: &mut dyn Writer) -> Result<(), CvError> {
        loop {
            if self.control.is_stopped() {
                return Ok(());
            }
            match self.pass(ctx, w)? {
                Pass::Finished => return Ok(()),
                Pass::Rewind => continue,
                Pass::Exhausted if !self.config.rewindable => return Ok(()),
                Pass::Exhausted => match self.control.wait() {
                    Signal::Rewind | Signal::Continue => {
                        debug!(uri = %self.config.uri, "Rewinding");
                    }
                    Signal::Stop => return Ok(()),
                },
            }
        }
    }

    /// Reads the URI from its first frame. The capture handle lives for one pass.
    fn pass(&self, ctx: &Context, w: &mut dyn Writer) -> Result<Pass, CvError> {
        let uri = &self.config.uri;
        let mut capture = self.backend.open_uri(uri)?;
        info!(uri = %uri, "Start reading video stream or file");

        let mut frames: u64 = 0;
        self.frames.store(0, Ordering::Release);
        loop {
            match self.control.poll() {
                Signal::Continue => {}
                Signal::Rewind => return Ok(Pass::Rewind),
                Signal::Stop => {
                    info!(uri = %uri, frames, "Capture stopped");
                    return Ok(Pass::Finished);
                }
            }

            let mat = match capture.read() {
                Ok(Some(mat)) => mat,
                Ok(None) => return self.exhausted(frames),
                Err(e) => {
                    debug!(uri = %uri, "Frame read failed: {}", e);
                    return self.exhausted(frames);
                }
            };
            if self.backend.mat_is_empty(&mat) {
                debug!(uri = %uri, "Skipping empty frame");
                continue;
            }
            match deliver(&*self.backend, &mat, ctx, w)? {
                Delivery::Delivered => {
                    frames += 1;
                    self.frames.store(frames, Ordering::Release);
                }
                Delivery::SinkClosed => return Ok(Pass::Finished),
            }
            if self.config.frame_skip > 0 {
                capture.grab(self.config.frame_skip)?;
            }
        }
    }

    fn exhausted(&self, frames: u64) -> Result<Pass, CvError> {
        info!(uri = %self.config.uri, frames, "total read frames count is {}", frames);
        if self.config.next_frame_error {
            error!(uri = %self.config.uri, frames, "Cannot read a new frame");
            return Err(CvError::ReadFailure {
                origin: self.config.uri.clone(),
                frames,
            });
        }
        Ok(Pass::Exhausted)
    }
}

impl<B: VisionBackend> Source for CaptureFromUri<B> {
    fn generate_stream(&self, ctx: &Context, w: &mut dyn Writer) -> streamcv_core::Result<()> {
        Ok(self.stream(ctx, w)?)
    }

    fn stop(&self, _ctx: &Context) -> streamcv_core::Result<()> {
        self.control.stop();
        Ok(())
    }

    fn is_rewindable(&self) -> bool {
        self.config.rewindable
    }

    fn rewind(&self, _ctx: &Context) -> streamcv_core::Result<()> {
        if !self.config.rewindable {
            return Err(streamcv_core::Error::NotRewindable);
        }
        self.control.request_rewind()
    }
}
