//! Registration of the adapter's sources, states and functions.

use crate::backend::VisionBackend;
use crate::capture::{FromDeviceCreator, FromUriCreator};
use crate::cascade::{detect_multi_scale, draw_rects, CascadeClassifierCreator};
use crate::error::CvError;
use crate::rect::Rect;
use crate::shared_image::{mount_alpha_image, SharedImageCreator};
use std::marker::PhantomData;
use std::sync::Arc;
use streamcv_core::{Context, Map, Registry, Udf, Value};
use tracing::info;

pub const CAPTURE_FROM_URI: &str = "opencv_capture_from_uri";
pub const CAPTURE_FROM_DEVICE: &str = "opencv_capture_from_device";
pub const CASCADE_CLASSIFIER: &str = "opencv_cascade_classifier";
pub const DETECT_MULTI_SCALE: &str = "opencv_detect_multi_scale";
pub const DRAW_RECTS: &str = "opencv_draw_rects";
pub const SHARED_IMAGE: &str = "opencv_shared_image";
pub const MOUNT_IMAGE: &str = "opencv_mount_image";

/// Registers every capability under its `opencv_*` name.
pub fn register<B: VisionBackend>(registry: &mut Registry, backend: Arc<B>) -> streamcv_core::Result<()> {
    registry.register_source_creator(CAPTURE_FROM_URI, Arc::new(FromUriCreator::new(backend.clone())))?;
    registry.register_source_creator(
        CAPTURE_FROM_DEVICE,
        Arc::new(FromDeviceCreator::new(backend.clone())),
    )?;
    registry.register_state_creator(
        CASCADE_CLASSIFIER,
        Arc::new(CascadeClassifierCreator::new(backend.clone())),
    )?;
    registry.register_state_creator(SHARED_IMAGE, Arc::new(SharedImageCreator::new(backend.clone())))?;
    registry.register_udf(DETECT_MULTI_SCALE, Arc::new(DetectMultiScaleUdf::<B>::new()))?;
    registry.register_udf(DRAW_RECTS, Arc::new(DrawRectsUdf::new(backend)))?;
    registry.register_udf(MOUNT_IMAGE, Arc::new(MountImageUdf::<B>::new()))?;
    info!("OpenCV plugin registered");
    Ok(())
}

fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Value, CvError> {
    args.get(index).ok_or_else(|| CvError::MissingField(name.to_string()))
}

fn arg_str<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str, CvError> {
    let value = arg(args, index, name)?;
    value.as_str().ok_or_else(|| mistyped(value, name, "string"))
}

fn arg_map<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Map, CvError> {
    let value = arg(args, index, name)?;
    value.as_map().ok_or_else(|| mistyped(value, name, "map"))
}

fn arg_rects(args: &[Value], index: usize) -> Result<Vec<Rect>, CvError> {
    let value = arg(args, index, "rects")?;
    let values = value
        .as_array()
        .ok_or_else(|| mistyped(value, "rects", "array"))?;
    Rect::from_values(values)
}

fn mistyped(value: &Value, name: &str, expected: &'static str) -> CvError {
    CvError::TypeCoercion {
        field: name.to_string(),
        expected,
        actual: value.type_name().to_string(),
    }
}

/// `opencv_detect_multi_scale(classifier_name, image) -> [rect]`
pub struct DetectMultiScaleUdf<B> {
    backend: PhantomData<fn() -> B>,
}

impl<B: VisionBackend> DetectMultiScaleUdf<B> {
    pub fn new() -> Self {
        Self {
            backend: PhantomData,
        }
    }
}

impl<B: VisionBackend> Default for DetectMultiScaleUdf<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: VisionBackend> Udf for DetectMultiScaleUdf<B> {
    fn arity(&self) -> usize {
        2
    }

    fn call(&self, ctx: &Context, args: &[Value]) -> streamcv_core::Result<Value> {
        let name = arg_str(args, 0, "classifier_name")?;
        let img = arg_map(args, 1, "image")?;
        let rects = detect_multi_scale::<B>(ctx, name, img)?;
        Ok(Value::Array(rects.iter().map(Rect::to_value).collect()))
    }
}

/// `opencv_draw_rects(image, rects) -> image`
pub struct DrawRectsUdf<B> {
    backend: Arc<B>,
}

impl<B: VisionBackend> DrawRectsUdf<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

impl<B: VisionBackend> Udf for DrawRectsUdf<B> {
    fn arity(&self) -> usize {
        2
    }

    fn call(&self, _ctx: &Context, args: &[Value]) -> streamcv_core::Result<Value> {
        let img = arg_map(args, 0, "image")?;
        let rects = arg_rects(args, 1)?;
        let out = draw_rects(&*self.backend, img, &rects)?;
        Ok(Value::Map(out.into_owned()))
    }
}

/// `opencv_mount_image(image_name, back, rects) -> image`
pub struct MountImageUdf<B> {
    backend: PhantomData<fn() -> B>,
}

impl<B: VisionBackend> MountImageUdf<B> {
    pub fn new() -> Self {
        Self {
            backend: PhantomData,
        }
    }
}

impl<B: VisionBackend> Default for MountImageUdf<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: VisionBackend> Udf for MountImageUdf<B> {
    fn arity(&self) -> usize {
        3
    }

    fn call(&self, ctx: &Context, args: &[Value]) -> streamcv_core::Result<Value> {
        let name = arg_str(args, 0, "image_name")?;
        let back = arg_map(args, 1, "back")?;
        let rects = arg_rects(args, 2)?;
        let out = mount_alpha_image::<B>(ctx, name, back, &rects)?;
        Ok(Value::Map(out.into_owned()))
    }
}
