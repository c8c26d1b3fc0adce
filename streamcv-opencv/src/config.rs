//! Configuration for the capture sources

use crate::error::CvError;
use crate::raw_data::ImageFormat;
use serde::{Deserialize, Serialize};
use streamcv_core::{Map, MapExt};
use tracing::warn;

pub const DEVICE_ID_KEY: &str = "device_id";
pub const URI_KEY: &str = "uri";
pub const FORMAT_KEY: &str = "format";
pub const WIDTH_KEY: &str = "width";
pub const HEIGHT_KEY: &str = "height";
pub const FPS_KEY: &str = "fps";
pub const FRAME_SKIP_KEY: &str = "frame_skip";
pub const NEXT_FRAME_ERROR_KEY: &str = "next_frame_error";
pub const REWINDABLE_KEY: &str = "rewindable";
/// Deprecated spelling of [`REWINDABLE_KEY`].
pub const REWIND_KEY: &str = "rewind";

/// Output format of a source. Only `cvmat` is produced.
fn output_format(params: &Map) -> Result<ImageFormat, CvError> {
    let format = match params.get_opt_str(FORMAT_KEY)? {
        Some(tag) => tag.parse()?,
        None => ImageFormat::CvMat,
    };
    match format {
        ImageFormat::CvMat => Ok(format),
        other => Err(CvError::UnsupportedFormat(format!(
            "'{}' is not supported as a capture output",
            other
        ))),
    }
}

/// Reads an optional non-negative integer. Absent or zero means unset.
fn optional_u32(params: &Map, key: &str) -> Result<Option<u32>, CvError> {
    let value = match params.get_opt_int(key)? {
        Some(v) => v,
        None => return Ok(None),
    };
    let value = u32::try_from(value).map_err(|_| CvError::TypeCoercion {
        field: key.to_string(),
        expected: "non-negative 32-bit int",
        actual: value.to_string(),
    })?;
    Ok(if value == 0 { None } else { Some(value) })
}

/// Camera source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCaptureConfig {
    /// Camera index passed to the capture backend.
    pub device_id: i32,
    pub format: ImageFormat,
    /// Overrides of the device defaults; `None` keeps the default.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
}

impl DeviceCaptureConfig {
    pub fn new(device_id: i32) -> Self {
        Self {
            device_id,
            format: ImageFormat::CvMat,
            width: None,
            height: None,
            fps: None,
        }
    }

    pub fn from_params(params: &Map) -> Result<Self, CvError> {
        let id = params.get_int(DEVICE_ID_KEY)?;
        let device_id = i32::try_from(id).map_err(|_| CvError::TypeCoercion {
            field: DEVICE_ID_KEY.to_string(),
            expected: "32-bit int",
            actual: id.to_string(),
        })?;
        Ok(Self {
            device_id,
            format: output_format(params)?,
            width: optional_u32(params, WIDTH_KEY)?,
            height: optional_u32(params, HEIGHT_KEY)?,
            fps: optional_u32(params, FPS_KEY)?,
        })
    }
}

/// Video file / stream source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriCaptureConfig {
    pub uri: String,
    pub format: ImageFormat,
    /// Frames discarded after each delivered frame.
    pub frame_skip: u32,
    /// Report running out of frames as an error instead of a clean end.
    pub next_frame_error: bool,
    pub rewindable: bool,
}

impl UriCaptureConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            format: ImageFormat::CvMat,
            frame_skip: 0,
            next_frame_error: true,
            rewindable: false,
        }
    }

    pub fn from_params(params: &Map) -> Result<Self, CvError> {
        let uri = params.get_str(URI_KEY)?.to_string();
        let format = output_format(params)?;
        let frame_skip = optional_u32(params, FRAME_SKIP_KEY)?.unwrap_or(0);
        let next_frame_error = params.get_opt_bool(NEXT_FRAME_ERROR_KEY)?.unwrap_or(true);

        let rewindable = match params.get_opt_bool(REWINDABLE_KEY)? {
            Some(rewindable) => rewindable,
            None => {
                let alias = params.get_opt_bool(REWIND_KEY)?;
                if alias.is_some() {
                    warn!(
                        uri = %uri,
                        "'{}' parameter is deprecated, use '{}' instead",
                        REWIND_KEY,
                        REWINDABLE_KEY
                    );
                }
                alias.unwrap_or(false)
            }
        };

        Ok(Self {
            uri,
            format,
            frame_skip,
            next_frame_error,
            rewindable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamcv_core::Value;

    fn params(entries: &[(&str, Value)]) -> Map {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_device_defaults() {
        let config = DeviceCaptureConfig::from_params(&params(&[(DEVICE_ID_KEY, Value::Int(0))])).unwrap();
        assert_eq!(config, DeviceCaptureConfig::new(0));
    }

    #[test]
    fn test_device_overrides() {
        let config = DeviceCaptureConfig::from_params(&params(&[
            (DEVICE_ID_KEY, Value::Int(2)),
            (WIDTH_KEY, Value::Int(640)),
            (HEIGHT_KEY, Value::Int(0)),
            (FPS_KEY, Value::Int(15)),
        ]))
        .unwrap();
        assert_eq!(config.device_id, 2);
        assert_eq!(config.width, Some(640));
        assert_eq!(config.height, None);
        assert_eq!(config.fps, Some(15));
    }

    #[test]
    fn test_device_id_required() {
        match DeviceCaptureConfig::from_params(&Map::new()) {
            Err(CvError::MissingField(field)) => assert_eq!(field, DEVICE_ID_KEY),
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_device_params_are_strict() {
        let result = DeviceCaptureConfig::from_params(&params(&[(DEVICE_ID_KEY, Value::from("0"))]));
        assert!(matches!(result, Err(CvError::TypeCoercion { .. })));

        let result = DeviceCaptureConfig::from_params(&params(&[
            (DEVICE_ID_KEY, Value::Int(0)),
            (WIDTH_KEY, Value::Int(-640)),
        ]));
        assert!(matches!(result, Err(CvError::TypeCoercion { .. })));
    }

    #[test]
    fn test_uri_defaults() {
        let config = UriCaptureConfig::from_params(&params(&[(URI_KEY, Value::from("a.avi"))])).unwrap();
        assert_eq!(config, UriCaptureConfig::new("a.avi"));
        assert!(config.next_frame_error);
    }

    #[test]
    fn test_uri_required() {
        match UriCaptureConfig::from_params(&params(&[(FRAME_SKIP_KEY, Value::Int(1))])) {
            Err(CvError::MissingField(field)) => assert_eq!(field, URI_KEY),
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_format_rejected_at_construction() {
        for tag in ["jpeg", "cvmat4b", "unknown", "png"] {
            let result = UriCaptureConfig::from_params(&params(&[
                (URI_KEY, Value::from("a.avi")),
                (FORMAT_KEY, Value::from(tag)),
            ]));
            assert!(
                matches!(result, Err(CvError::UnsupportedFormat(_))),
                "{} should be rejected",
                tag
            );
        }
        let result = DeviceCaptureConfig::from_params(&params(&[
            (DEVICE_ID_KEY, Value::Int(0)),
            (FORMAT_KEY, Value::from("jpeg")),
        ]));
        assert!(matches!(result, Err(CvError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_rewind_alias() {
        let config = UriCaptureConfig::from_params(&params(&[
            (URI_KEY, Value::from("a.avi")),
            (REWIND_KEY, Value::Bool(true)),
        ]))
        .unwrap();
        assert!(config.rewindable);

        let config = UriCaptureConfig::from_params(&params(&[
            (URI_KEY, Value::from("a.avi")),
            (REWIND_KEY, Value::Bool(true)),
            (REWINDABLE_KEY, Value::Bool(false)),
        ]))
        .unwrap();
        assert!(!config.rewindable);
    }

    #[test]
    fn test_rewind_alias_ignored_when_rewindable_set() {
        let config = UriCaptureConfig::from_params(&params(&[
            (URI_KEY, Value::from("a.avi")),
            (REWIND_KEY, Value::from("yes")),
            (REWINDABLE_KEY, Value::Bool(true)),
        ]))
        .unwrap();
        assert!(config.rewindable);

        let result = UriCaptureConfig::from_params(&params(&[
            (URI_KEY, Value::from("a.avi")),
            (REWIND_KEY, Value::from("yes")),
        ]));
        assert!(matches!(result, Err(CvError::TypeCoercion { .. })));
    }

    #[test]
    fn test_uri_flags() {
        let config = UriCaptureConfig::from_params(&params(&[
            (URI_KEY, Value::from("rtsp://cam")),
            (FRAME_SKIP_KEY, Value::Int(4)),
            (NEXT_FRAME_ERROR_KEY, Value::Bool(false)),
            (REWINDABLE_KEY, Value::Bool(true)),
        ]))
        .unwrap();
        assert_eq!(config.frame_skip, 4);
        assert!(!config.next_frame_error);
        assert!(config.rewindable);

        let result = UriCaptureConfig::from_params(&params(&[
            (URI_KEY, Value::from("a.avi")),
            (NEXT_FRAME_ERROR_KEY, Value::from("false")),
        ]));
        assert!(matches!(result, Err(CvError::TypeCoercion { .. })));
    }
}
