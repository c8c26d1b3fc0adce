//! OpenCV implementation of the vision backend.

use super::{blend_bgra_onto_bgr, Capture, CaptureProperty, VisionBackend};
use crate::error::CvError;
use crate::rect::Rect;
use opencv::{
    core::{Mat, Rect as CvRect, Scalar, Size, Vector, CV_8UC3},
    imgcodecs, imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
    videoio::{self, VideoCapture, CAP_ANY},
};
use std::path::Path;
use tracing::debug;

/// Detection parameters passed to `detectMultiScale`.
const SCALE_FACTOR: f64 = 1.1;
const MIN_NEIGHBORS: i32 = 3;
/// Outline colour (BGR) and thickness used by `draw_rects`.
const RECT_COLOR: (f64, f64, f64) = (255.0, 0.0, 0.0);
const RECT_THICKNESS: i32 = 3;

fn path_str(path: &Path) -> Result<&str, CvError> {
    path.to_str()
        .ok_or_else(|| CvError::ResourceOpen(format!("non UTF-8 path '{}'", path.display())))
}

fn to_cv_rect(r: &Rect) -> CvRect {
    CvRect::new(r.x, r.y, r.width, r.height)
}

/// Wraps `cv::VideoCapture`; the handle is released on drop.
pub struct OpenCvCapture {
    inner: VideoCapture,
}

impl Capture for OpenCvCapture {
    type Mat = Mat;

    fn read(&mut self) -> Result<Option<Mat>, CvError> {
        let mut frame = Mat::default();
        if self.inner.read(&mut frame)? {
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }

    fn grab(&mut self, frames: u32) -> Result<(), CvError> {
        for _ in 0..frames {
            if !self.inner.grab()? {
                break;
            }
        }
        Ok(())
    }

    fn set(&mut self, property: CaptureProperty, value: f64) -> Result<bool, CvError> {
        let prop = match property {
            CaptureProperty::FrameWidth => videoio::CAP_PROP_FRAME_WIDTH,
            CaptureProperty::FrameHeight => videoio::CAP_PROP_FRAME_HEIGHT,
            CaptureProperty::Fps => videoio::CAP_PROP_FPS,
        };
        Ok(self.inner.set(prop, value)?)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvBackend;

impl OpenCvBackend {
    pub fn new() -> Self {
        Self
    }

    fn opened(capture: VideoCapture, what: String) -> Result<OpenCvCapture, CvError> {
        if !capture.is_opened()? {
            return Err(CvError::ResourceOpen(what));
        }
        Ok(OpenCvCapture { inner: capture })
    }
}

impl VisionBackend for OpenCvBackend {
    type Mat = Mat;
    type AlphaMat = Mat;
    type Classifier = CascadeClassifier;
    type Capture = OpenCvCapture;

    fn open_device(&self, device_id: i32) -> Result<OpenCvCapture, CvError> {
        let capture = VideoCapture::new(device_id, CAP_ANY)
            .map_err(|e| CvError::ResourceOpen(format!("device {}: {}", device_id, e)))?;
        Self::opened(capture, format!("device {}", device_id))
    }

    fn open_uri(&self, uri: &str) -> Result<OpenCvCapture, CvError> {
        let capture = VideoCapture::from_file(uri, CAP_ANY)
            .map_err(|e| CvError::ResourceOpen(format!("video stream or file '{}': {}", uri, e)))?;
        Self::opened(capture, format!("video stream or file '{}'", uri))
    }

    fn mat_from_bgr(&self, width: u32, height: u32, data: &[u8]) -> Result<Mat, CvError> {
        let rows = i32::try_from(height)
            .map_err(|_| CvError::OpenCv(format!("height {} out of range", height)))?;
        let cols = i32::try_from(width)
            .map_err(|_| CvError::OpenCv(format!("width {} out of range", width)))?;
        let mut mat = Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0))?;
        if !data.is_empty() {
            mat.data_bytes_mut()?.copy_from_slice(data);
        }
        Ok(mat)
    }

    fn mat_to_bgr(&self, mat: &Mat) -> Result<(u32, u32, Vec<u8>), CvError> {
        if self.mat_is_empty(mat) {
            return Ok((0, 0, Vec::new()));
        }
        if mat.channels() != 3 {
            return Err(CvError::OpenCv(format!(
                "expected a 3-channel matrix, got {} channels",
                mat.channels()
            )));
        }
        let data = match mat.data_bytes() {
            Ok(bytes) => bytes.to_vec(),
            // not continuous, compact it first
            Err(_) => mat.try_clone()?.data_bytes()?.to_vec(),
        };
        Ok((mat.cols() as u32, mat.rows() as u32, data))
    }

    fn mat_is_empty(&self, mat: &Mat) -> bool {
        mat.rows() <= 0 || mat.cols() <= 0
    }

    fn load_classifier(&self, path: &Path) -> Result<CascadeClassifier, CvError> {
        let mut classifier = CascadeClassifier::default()?;
        if !classifier.load(path_str(path)?)? {
            return Err(CvError::ResourceOpen(format!(
                "cannot load the file '{}'",
                path.display()
            )));
        }
        Ok(classifier)
    }

    fn detect_multi_scale(
        &self,
        classifier: &mut CascadeClassifier,
        mat: &Mat,
    ) -> Result<Vec<Rect>, CvError> {
        // detectMultiScale asserts on a cascade without stages
        if classifier.empty()? {
            debug!("cascade has no stages, skipping detection");
            return Ok(Vec::new());
        }
        let mut objects = Vector::<CvRect>::new();
        classifier.detect_multi_scale(
            mat,
            &mut objects,
            SCALE_FACTOR,
            MIN_NEIGHBORS,
            0,
            Size::new(0, 0),
            Size::new(0, 0),
        )?;
        Ok(objects
            .iter()
            .map(|r| Rect::new(r.x, r.y, r.width, r.height))
            .collect())
    }

    fn draw_rects(&self, mat: &mut Mat, rects: &[Rect]) -> Result<(), CvError> {
        let (b, g, r) = RECT_COLOR;
        for rect in rects {
            imgproc::rectangle(
                mat,
                to_cv_rect(rect),
                Scalar::new(b, g, r, 0.0),
                RECT_THICKNESS,
                imgproc::LINE_8,
                0,
            )?;
        }
        Ok(())
    }

    fn load_alpha_image(&self, path: &Path) -> Result<Mat, CvError> {
        let image = imgcodecs::imread(path_str(path)?, imgcodecs::IMREAD_UNCHANGED)?;
        if self.mat_is_empty(&image) {
            return Err(CvError::ResourceOpen(format!(
                "cannot load the image '{}'",
                path.display()
            )));
        }
        let code = match image.channels() {
            4 => return Ok(image),
            3 => imgproc::COLOR_BGR2BGRA,
            1 => imgproc::COLOR_GRAY2BGRA,
            n => {
                return Err(CvError::OpenCv(format!(
                    "unsupported channel count {} in '{}'",
                    n,
                    path.display()
                )))
            }
        };
        let mut bgra = Mat::default();
        imgproc::cvt_color(&image, &mut bgra, code, 0)?;
        Ok(bgra)
    }

    fn mount_alpha_image(&self, overlay: &Mat, back: &mut Mat, rects: &[Rect]) -> Result<(), CvError> {
        let (width, height) = (back.cols() as u32, back.rows() as u32);
        for rect in rects {
            if rect.width <= 0 || rect.height <= 0 {
                continue;
            }
            let mut resized = Mat::default();
            imgproc::resize(
                overlay,
                &mut resized,
                Size::new(rect.width, rect.height),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )?;
            let pixels = match resized.data_bytes() {
                Ok(bytes) => bytes.to_vec(),
                Err(_) => resized.try_clone()?.data_bytes()?.to_vec(),
            };
            blend_bgra_onto_bgr(back.data_bytes_mut()?, width, height, &pixels, rect);
        }
        Ok(())
    }
}
