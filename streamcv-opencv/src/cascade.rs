//! Cascade classifier shared state and the detect / draw operations.

use crate::backend::VisionBackend;
use crate::error::CvError;
use crate::raw_data::RawData;
use crate::rect::Rect;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use streamcv_core::{Context, Error as CoreError, Map, MapExt, SharedState, SharedStateCreator};
use tracing::{debug, info};

/// Parameter naming the file a shared state is loaded from.
pub const FILE_KEY: &str = "file";
pub const CLASSIFIER_STATE_KIND: &str = "cascade_classifier.state";

/// A loaded cascade classifier, shared between pipeline workers.
///
/// Detection mutates the native classifier, so calls on one state are
/// serialised. The handle is released exactly once by [`SharedState::terminate`].
pub struct CascadeClassifierState<B: VisionBackend> {
    backend: Arc<B>,
    path: PathBuf,
    classifier: Mutex<Option<B::Classifier>>,
}

impl<B: VisionBackend> CascadeClassifierState<B> {
    pub fn load(backend: Arc<B>, path: impl Into<PathBuf>) -> Result<Self, CvError> {
        let path = path.into();
        let classifier = backend.load_classifier(&path)?;
        info!(file = %path.display(), "Cascade classifier loaded");
        Ok(Self {
            backend,
            path,
            classifier: Mutex::new(Some(classifier)),
        })
    }

    /// Loads the cascade named by the `file` parameter.
    pub fn from_params(backend: Arc<B>, params: &Map) -> Result<Self, CvError> {
        let file = params.get_str(FILE_KEY)?;
        Self::load(backend, file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier.lock().is_some()
    }

    /// Runs multi-scale detection. No detections is an empty list.
    pub fn detect(&self, raw: &RawData) -> Result<Vec<Rect>, CvError> {
        let mat = raw.to_mat(&*self.backend)?;
        let mut guard = self.classifier.lock();
        let classifier = guard.as_mut().ok_or_else(|| {
            CvError::StateLookup(format!(
                "cascade classifier '{}' has been terminated",
                self.path.display()
            ))
        })?;
        self.backend.detect_multi_scale(classifier, &mat)
    }
}

impl<B: VisionBackend> SharedState for CascadeClassifierState<B> {
    fn terminate(&self, _ctx: &Context) -> streamcv_core::Result<()> {
        if self.classifier.lock().take().is_some() {
            debug!(file = %self.path.display(), "Cascade classifier released");
        }
        Ok(())
    }
}

pub struct CascadeClassifierCreator<B: VisionBackend> {
    backend: Arc<B>,
}

impl<B: VisionBackend> CascadeClassifierCreator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

impl<B: VisionBackend> SharedStateCreator for CascadeClassifierCreator<B> {
    fn create_state(&self, _ctx: &Context, params: &Map) -> streamcv_core::Result<Arc<dyn SharedState>> {
        let state = CascadeClassifierState::from_params(self.backend.clone(), params)?;
        Ok(Arc::new(state))
    }
}

/// Finds the classifier registered under `name`.
pub fn lookup_cascade_classifier<B: VisionBackend>(
    ctx: &Context,
    name: &str,
) -> Result<Arc<CascadeClassifierState<B>>, CvError> {
    ctx.shared_states()
        .get_as::<CascadeClassifierState<B>>(name)
        .map_err(|e| match e {
            CoreError::StateTypeMismatch { .. } => CvError::StateLookup(format!(
                "state '{}' cannot be converted to {}",
                name, CLASSIFIER_STATE_KIND
            )),
            other => other.into(),
        })
}

/// Detects objects in the image record `img` with the classifier `name`.
pub fn detect_multi_scale<B: VisionBackend>(
    ctx: &Context,
    name: &str,
    img: &Map,
) -> Result<Vec<Rect>, CvError> {
    let raw = RawData::from_map(img)?;
    let classifier = lookup_cascade_classifier::<B>(ctx, name)?;
    classifier.detect(&raw)
}

/// Outlines `rects` on a copy of `img`. With no rects `img` is returned as is.
pub fn draw_rects<'a, B: VisionBackend + ?Sized>(
    backend: &B,
    img: &'a Map,
    rects: &[Rect],
) -> Result<Cow<'a, Map>, CvError> {
    if rects.is_empty() {
        return Ok(Cow::Borrowed(img));
    }
    let raw = RawData::from_map(img)?;
    let mut mat = raw.to_mat(backend)?;
    backend.draw_rects(&mut mat, rects)?;
    Ok(Cow::Owned(RawData::from_mat(backend, &mat)?.into_map()))
}
