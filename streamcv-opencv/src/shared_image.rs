//! Overlay image shared state and alpha mounting.

use crate::backend::VisionBackend;
use crate::cascade::FILE_KEY;
use crate::error::CvError;
use crate::raw_data::RawData;
use crate::rect::Rect;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use streamcv_core::{Context, Error as CoreError, Map, MapExt, SharedState, SharedStateCreator};
use tracing::{debug, info};

pub const SHARED_IMAGE_STATE_KIND: &str = "shared_image.state";

/// A 4-channel overlay loaded once and mounted onto many frames.
pub struct SharedImageState<B: VisionBackend> {
    backend: Arc<B>,
    path: PathBuf,
    image: Mutex<Option<B::AlphaMat>>,
}

impl<B: VisionBackend> SharedImageState<B> {
    pub fn load(backend: Arc<B>, path: impl Into<PathBuf>) -> Result<Self, CvError> {
        let path = path.into();
        let image = backend.load_alpha_image(&path)?;
        info!(file = %path.display(), "Shared image loaded");
        Ok(Self {
            backend,
            path,
            image: Mutex::new(Some(image)),
        })
    }

    pub fn from_params(backend: Arc<B>, params: &Map) -> Result<Self, CvError> {
        let file = params.get_str(FILE_KEY)?;
        Self::load(backend, file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.image.lock().is_some()
    }

    /// Composites the overlay onto a copy of `back` at every rect.
    pub fn mount(&self, back: &RawData, rects: &[Rect]) -> Result<RawData, CvError> {
        let mut mat = back.to_mat(&*self.backend)?;
        {
            let guard = self.image.lock();
            let image = guard.as_ref().ok_or_else(|| {
                CvError::StateLookup(format!(
                    "shared image '{}' has been terminated",
                    self.path.display()
                ))
            })?;
            self.backend.mount_alpha_image(image, &mut mat, rects)?;
        }
        RawData::from_mat(&*self.backend, &mat)
    }
}

impl<B: VisionBackend> SharedState for SharedImageState<B> {
    fn terminate(&self, _ctx: &Context) -> streamcv_core::Result<()> {
        if self.image.lock().take().is_some() {
            debug!(file = %self.path.display(), "Shared image released");
        }
        Ok(())
    }
}

pub struct SharedImageCreator<B: VisionBackend> {
    backend: Arc<B>,
}

impl<B: VisionBackend> SharedImageCreator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

impl<B: VisionBackend> SharedStateCreator for SharedImageCreator<B> {
    fn create_state(&self, _ctx: &Context, params: &Map) -> streamcv_core::Result<Arc<dyn SharedState>> {
        let state = SharedImageState::from_params(self.backend.clone(), params)?;
        Ok(Arc::new(state))
    }
}

pub fn lookup_shared_image<B: VisionBackend>(
    ctx: &Context,
    name: &str,
) -> Result<Arc<SharedImageState<B>>, CvError> {
    ctx.shared_states()
        .get_as::<SharedImageState<B>>(name)
        .map_err(|e| match e {
            CoreError::StateTypeMismatch { .. } => CvError::StateLookup(format!(
                "state '{}' cannot be converted to {}",
                name, SHARED_IMAGE_STATE_KIND
            )),
            other => other.into(),
        })
}

/// Mounts the shared image `name` onto `back` at `rects`. With no rects
/// `back` is returned as is and the state is not looked up.
pub fn mount_alpha_image<'a, B: VisionBackend>(
    ctx: &Context,
    name: &str,
    back: &'a Map,
    rects: &[Rect],
) -> Result<Cow<'a, Map>, CvError> {
    if rects.is_empty() {
        return Ok(Cow::Borrowed(back));
    }
    let image = lookup_shared_image::<B>(ctx, name)?;
    let raw = RawData::from_map(back)?;
    Ok(Cow::Owned(image.mount(&raw, rects)?.into_map()))
}
