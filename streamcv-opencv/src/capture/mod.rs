//! Frame sources backed by a video capture handle.
//!
//! Both sources validate their parameters when they are created and open the
//! capture handle only when streaming starts. The handle is owned by the read
//! loop and dropped on every exit path.

mod device;
mod uri;

pub use device::{CaptureFromDevice, FromDeviceCreator};
pub use uri::{CaptureFromUri, FromUriCreator};

use crate::backend::VisionBackend;
use crate::error::CvError;
use crate::raw_data::RawData;
use streamcv_core::{Context, Tuple, Writer};
use tracing::warn;

/// What happened to a frame handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    /// The sink is gone; the source should end without an error.
    SinkClosed,
}

fn deliver<B: VisionBackend>(
    backend: &B,
    mat: &B::Mat,
    ctx: &Context,
    w: &mut dyn Writer,
) -> Result<Delivery, CvError> {
    let raw = RawData::from_mat(backend, mat)?;
    match w.write(ctx, Tuple::new(raw.into_map())) {
        Ok(()) => Ok(Delivery::Delivered),
        Err(e) if e.is_sink_closed() => {
            warn!("Frame receiver closed, stopping capture");
            Ok(Delivery::SinkClosed)
        }
        Err(e) => Err(e.into()),
    }
}
