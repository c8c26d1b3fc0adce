//! streamcv-opencv: OpenCV plugin for the streamcv engine
//!
//! Provides camera and video-file sources, a cascade classifier shared state
//! with detection and rectangle drawing, and a shared overlay image that can
//! be alpha-mounted onto frames.
//!
//! Frames travel between plugins as [`RawData`] records. The vision work is
//! delegated to a [`VisionBackend`]; the OpenCV backend is enabled with the
//! `opencv` feature and an in-memory scripted backend with `testing`.

pub mod backend;
pub mod capture;
pub mod cascade;
pub mod config;
pub mod error;
pub mod plugin;
pub mod raw_data;
pub mod rect;
pub mod shared_image;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{Capture, CaptureProperty, VisionBackend};
#[cfg(feature = "opencv")]
pub use backend::opencv::OpenCvBackend;
pub use capture::{CaptureFromDevice, CaptureFromUri, FromDeviceCreator, FromUriCreator};
pub use cascade::{detect_multi_scale, draw_rects, CascadeClassifierState};
pub use config::{DeviceCaptureConfig, UriCaptureConfig};
pub use error::CvError;
pub use plugin::register;
pub use raw_data::{ImageFormat, RawData};
pub use rect::Rect;
pub use shared_image::{mount_alpha_image, SharedImageState};
