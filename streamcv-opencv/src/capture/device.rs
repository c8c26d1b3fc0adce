//! Camera device capture

use super::{deliver, Delivery};
use crate::backend::{Capture, CaptureProperty, VisionBackend};
use crate::config::DeviceCaptureConfig;
use crate::error::CvError;
use std::sync::Arc;
use streamcv_core::{Context, Map, Signal, Source, SourceControl, SourceCreator, Writer};
use tracing::{debug, error, info, warn};

/// Creates [`CaptureFromDevice`] sources from host parameters.
pub struct FromDeviceCreator<B: VisionBackend> {
    backend: Arc<B>,
}

impl<B: VisionBackend> FromDeviceCreator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

impl<B: VisionBackend> SourceCreator for FromDeviceCreator<B> {
    fn create_source(&self, _ctx: &Context, params: &Map) -> streamcv_core::Result<Arc<dyn Source>> {
        let config = DeviceCaptureConfig::from_params(params)?;
        Ok(Arc::new(CaptureFromDevice::new(self.backend.clone(), config)))
    }
}

/// Streams frames from a live camera.
///
/// A live device always has a next frame, so a failed read is fatal.
pub struct CaptureFromDevice<B: VisionBackend> {
    backend: Arc<B>,
    config: DeviceCaptureConfig,
    control: SourceControl,
}

impl<B: VisionBackend> CaptureFromDevice<B> {
    pub fn new(backend: Arc<B>, config: DeviceCaptureConfig) -> Self {
        Self {
            backend,
            config,
            control: SourceControl::new(),
        }
    }

    pub fn config(&self) -> &DeviceCaptureConfig {
        &self.config
    }

    fn open(&self) -> Result<B::Capture, CvError> {
        let id = self.config.device_id;
        let mut capture = self.backend.open_device(id)?;

        let overrides = [
            (CaptureProperty::FrameWidth, self.config.width),
            (CaptureProperty::FrameHeight, self.config.height),
            (CaptureProperty::Fps, self.config.fps),
        ];
        for (property, value) in overrides {
            if let Some(value) = value {
                if !capture.set(property, f64::from(value))? {
                    warn!(device_id = id, "Device rejected {:?} = {}", property, value);
                }
            }
        }
        Ok(capture)
    }

    fn read_failure(&self, frames: u64) -> CvError {
        CvError::ReadFailure {
            origin: format!("device {}", self.config.device_id),
            frames,
        }
    }

    fn stream(&self, ctx: &Context, w: &mut dyn Writer) -> Result<(), CvError> {
        let id = self.config.device_id;
        if self.control.is_stopped() {
            return Ok(());
        }
        let mut capture = self.open()?;
        info!(device_id = id, "Start reading camera device");

        let mut frames: u64 = 0;
        while self.control.poll() != Signal::Stop {
            let mat = match capture.read() {
                Ok(Some(mat)) => mat,
                Ok(None) => {
                    error!(device_id = id, frames, "Cannot read a new frame");
                    return Err(self.read_failure(frames));
                }
                Err(e) => {
                    error!(device_id = id, frames, "Frame read failed: {}", e);
                    return Err(self.read_failure(frames));
                }
            };
            if self.backend.mat_is_empty(&mat) {
                debug!(device_id = id, "Skipping empty frame");
                continue;
            }
            match deliver(&*self.backend, &mat, ctx, w)? {
                Delivery::Delivered => frames += 1,
                Delivery::SinkClosed => break,
            }
        }

        info!(device_id = id, frames, "Camera capture stopped");
        Ok(())
    }
}

impl<B: VisionBackend> Source for CaptureFromDevice<B> {
    fn generate_stream(&self, ctx: &Context, w: &mut dyn Writer) -> streamcv_core::Result<()> {
        Ok(self.stream(ctx, w)?)
    }

    fn stop(&self, _ctx: &Context) -> streamcv_core::Result<()> {
        self.control.stop();
        Ok(())
    }
}
