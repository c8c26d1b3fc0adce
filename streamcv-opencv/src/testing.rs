//! Deterministic in-memory backend for exercising pipelines without a
//! camera, a video file or a native OpenCV build.

use crate::backend::{blend_bgra_onto_bgr, outline_bgr, Capture, CaptureProperty, VisionBackend};
use crate::error::CvError;
use crate::raw_data::{ImageFormat, RawData};
use crate::rect::Rect;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Colour used for scripted rectangle outlines.
pub const OUTLINE_BGR: [u8; 3] = [0, 0, 255];

/// Outcome of one scripted `read`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedRead {
    Frame(ScriptedMat),
    /// A frame that decoded to nothing.
    Empty,
    /// No frame could be read.
    Missing,
    /// The native call itself failed.
    Error(String),
}

/// Packed BGR matrix owned by the scripted backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptedMat {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ScriptedMat {
    pub fn solid(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        Self {
            width,
            height,
            data: bgr.repeat(width as usize * height as usize),
        }
    }
}

/// Solid-colour `cvmat` frame.
pub fn solid_frame(width: u32, height: u32, bgr: [u8; 3]) -> RawData {
    let mat = ScriptedMat::solid(width, height, bgr);
    RawData::new(ImageFormat::CvMat, mat.width, mat.height, mat.data)
}

/// `count` solid frames whose blue channel is the frame index.
pub fn numbered_frames(count: usize, width: u32, height: u32) -> Vec<ScriptedRead> {
    (0..count)
        .map(|i| ScriptedRead::Frame(ScriptedMat::solid(width, height, [i as u8, 0, 0])))
        .collect()
}

#[derive(Debug, Default)]
pub struct ScriptedStats {
    opened: AtomicUsize,
    released: AtomicUsize,
    reads: AtomicUsize,
    grabbed: AtomicUsize,
    properties: Mutex<Vec<(CaptureProperty, f64)>>,
    classifiers_released: AtomicUsize,
}

impl ScriptedStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn grabbed(&self) -> usize {
        self.grabbed.load(Ordering::SeqCst)
    }

    pub fn properties(&self) -> Vec<(CaptureProperty, f64)> {
        self.properties.lock().clone()
    }

    pub fn classifiers_released(&self) -> usize {
        self.classifiers_released.load(Ordering::SeqCst)
    }
}

pub struct ScriptedCapture {
    script: std::vec::IntoIter<ScriptedRead>,
    stats: Arc<ScriptedStats>,
}

impl Capture for ScriptedCapture {
    type Mat = ScriptedMat;

    fn read(&mut self) -> Result<Option<ScriptedMat>, CvError> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        match self.script.next() {
            Some(ScriptedRead::Frame(mat)) => Ok(Some(mat)),
            Some(ScriptedRead::Empty) => Ok(Some(ScriptedMat::default())),
            Some(ScriptedRead::Error(msg)) => Err(CvError::OpenCv(msg)),
            Some(ScriptedRead::Missing) | None => Ok(None),
        }
    }

    fn grab(&mut self, frames: u32) -> Result<(), CvError> {
        for _ in 0..frames {
            if self.script.next().is_none() {
                break;
            }
            self.stats.grabbed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn set(&mut self, property: CaptureProperty, value: f64) -> Result<bool, CvError> {
        self.stats.properties.lock().push((property, value));
        Ok(true)
    }
}

impl Drop for ScriptedCapture {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Classifier handle; counts its release.
pub struct ScriptedClassifier {
    pub path: PathBuf,
    stats: Arc<ScriptedStats>,
}

impl Drop for ScriptedClassifier {
    fn drop(&mut self) {
        self.stats.classifiers_released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Overlay image: a solid BGRA colour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedOverlay {
    pub bgra: [u8; 4],
}

#[derive(Default)]
pub struct ScriptedBackend {
    uris: HashMap<String, Vec<ScriptedRead>>,
    devices: HashMap<i32, Vec<ScriptedRead>>,
    detections: Vec<Rect>,
    overlay: Option<[u8; 4]>,
    stats: Arc<ScriptedStats>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every open of `uri` replays `reads` from the start.
    pub fn with_uri(mut self, uri: &str, reads: Vec<ScriptedRead>) -> Self {
        self.uris.insert(uri.to_string(), reads);
        self
    }

    pub fn with_device(mut self, device_id: i32, reads: Vec<ScriptedRead>) -> Self {
        self.devices.insert(device_id, reads);
        self
    }

    /// Rectangles returned by every detection on a non-empty cascade file.
    pub fn with_detections(mut self, rects: Vec<Rect>) -> Self {
        self.detections = rects;
        self
    }

    pub fn with_overlay(mut self, bgra: [u8; 4]) -> Self {
        self.overlay = Some(bgra);
        self
    }

    pub fn stats(&self) -> Arc<ScriptedStats> {
        self.stats.clone()
    }

    fn capture(&self, reads: Option<&Vec<ScriptedRead>>, what: String) -> Result<ScriptedCapture, CvError> {
        let reads = reads.ok_or(CvError::ResourceOpen(what))?;
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedCapture {
            script: reads.clone().into_iter(),
            stats: self.stats.clone(),
        })
    }
}

fn check_len(width: u32, height: u32, len: usize) -> Result<(), CvError> {
    let expected = width as usize * height as usize * 3;
    if expected != len {
        return Err(CvError::MalformedBuffer {
            format: ImageFormat::CvMat,
            width,
            height,
            expected,
            actual: len,
        });
    }
    Ok(())
}

impl VisionBackend for ScriptedBackend {
    type Mat = ScriptedMat;
    type AlphaMat = ScriptedOverlay;
    type Classifier = ScriptedClassifier;
    type Capture = ScriptedCapture;

    fn open_device(&self, device_id: i32) -> Result<ScriptedCapture, CvError> {
        self.capture(self.devices.get(&device_id), format!("device {}", device_id))
    }

    fn open_uri(&self, uri: &str) -> Result<ScriptedCapture, CvError> {
        self.capture(self.uris.get(uri), format!("video stream or file '{}'", uri))
    }

    fn mat_from_bgr(&self, width: u32, height: u32, data: &[u8]) -> Result<ScriptedMat, CvError> {
        check_len(width, height, data.len())?;
        Ok(ScriptedMat {
            width,
            height,
            data: data.to_vec(),
        })
    }

    fn mat_to_bgr(&self, mat: &ScriptedMat) -> Result<(u32, u32, Vec<u8>), CvError> {
        check_len(mat.width, mat.height, mat.data.len())?;
        Ok((mat.width, mat.height, mat.data.clone()))
    }

    fn mat_is_empty(&self, mat: &ScriptedMat) -> bool {
        mat.width == 0 || mat.height == 0
    }

    fn load_classifier(&self, path: &Path) -> Result<ScriptedClassifier, CvError> {
        if !path.is_file() {
            return Err(CvError::ResourceOpen(format!(
                "cannot load the file '{}'",
                path.display()
            )));
        }
        Ok(ScriptedClassifier {
            path: path.to_path_buf(),
            stats: self.stats.clone(),
        })
    }

    fn detect_multi_scale(
        &self,
        classifier: &mut ScriptedClassifier,
        mat: &ScriptedMat,
    ) -> Result<Vec<Rect>, CvError> {
        check_len(mat.width, mat.height, mat.data.len())?;
        // a cascade file declaring zero stages never detects anything
        let content = std::fs::read_to_string(&classifier.path).unwrap_or_default();
        if content.contains("<stageNum>0</stageNum>") {
            return Ok(Vec::new());
        }
        Ok(self.detections.clone())
    }

    fn draw_rects(&self, mat: &mut ScriptedMat, rects: &[Rect]) -> Result<(), CvError> {
        for rect in rects {
            outline_bgr(&mut mat.data, mat.width, mat.height, rect, OUTLINE_BGR);
        }
        Ok(())
    }

    fn load_alpha_image(&self, path: &Path) -> Result<ScriptedOverlay, CvError> {
        match self.overlay {
            Some(bgra) if path.is_file() => Ok(ScriptedOverlay { bgra }),
            _ => Err(CvError::ResourceOpen(format!(
                "cannot load the image '{}'",
                path.display()
            ))),
        }
    }

    fn mount_alpha_image(
        &self,
        overlay: &ScriptedOverlay,
        back: &mut ScriptedMat,
        rects: &[Rect],
    ) -> Result<(), CvError> {
        for rect in rects {
            if rect.width <= 0 || rect.height <= 0 {
                continue;
            }
            let scaled = overlay.bgra.repeat(rect.width as usize * rect.height as usize);
            blend_bgra_onto_bgr(&mut back.data, back.width, back.height, &scaled, rect);
        }
        Ok(())
    }
}
