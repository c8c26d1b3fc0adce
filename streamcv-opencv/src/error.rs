//! Error types for streamcv-opencv

use crate::raw_data::ImageFormat;
use streamcv_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CvError {
    #[error("Missing field: '{0}'")]
    MissingField(String),

    #[error("Invalid type for '{field}': expected {expected}, got {actual}")]
    TypeCoercion {
        field: String,
        expected: &'static str,
        actual: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed {format} buffer: {width}x{height} needs {expected} bytes, got {actual}")]
    MalformedBuffer {
        format: ImageFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot open {0}")]
    ResourceOpen(String),

    #[error("Cannot read a new frame from {origin} ({frames} frames delivered)")]
    ReadFailure { origin: String, frames: u64 },

    #[error("State lookup failed: {0}")]
    StateLookup(String),

    #[error("JPEG encoding failed: {0}")]
    Encode(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[error(transparent)]
    Host(CoreError),
}

impl CvError {
    pub fn is_sink_closed(&self) -> bool {
        matches!(self, CvError::Host(inner) if inner.is_sink_closed())
    }
}

impl From<CoreError> for CvError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingField(field) => CvError::MissingField(field),
            CoreError::TypeCoercion {
                field,
                expected,
                actual,
            } => CvError::TypeCoercion {
                field,
                expected,
                actual: actual.to_string(),
            },
            CoreError::StateNotFound(name) => {
                CvError::StateLookup(format!("state '{}' was not found", name))
            }
            CoreError::StateTypeMismatch { name, expected } => {
                CvError::StateLookup(format!("state '{}' cannot be converted to {}", name, expected))
            }
            CoreError::Plugin(inner) => match inner.downcast::<CvError>() {
                Ok(cv) => *cv,
                Err(other) => CvError::Host(CoreError::Plugin(other)),
            },
            other => CvError::Host(other),
        }
    }
}

impl From<CvError> for CoreError {
    fn from(err: CvError) -> Self {
        match err {
            CvError::Host(inner) => inner,
            other => CoreError::plugin(other),
        }
    }
}

impl From<image::ImageError> for CvError {
    fn from(err: image::ImageError) -> Self {
        CvError::Encode(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for CvError {
    fn from(err: opencv::Error) -> Self {
        CvError::OpenCv(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cv_error_display() {
        let err = CvError::ResourceOpen("device 3".to_string());
        assert!(err.to_string().contains("device 3"));

        let err = CvError::ReadFailure {
            origin: "a.avi".to_string(),
            frames: 3,
        };
        assert!(err.to_string().contains("a.avi"));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_round_trip_through_core_error() {
        let core: CoreError = CvError::UnsupportedFormat("'4k'".to_string()).into();
        assert!(core.downcast_plugin::<CvError>().is_some());
        match CvError::from(core) {
            CvError::UnsupportedFormat(msg) => assert_eq!(msg, "'4k'"),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_host_errors_are_unwrapped() {
        let cv = CvError::from(CoreError::SinkClosed);
        assert!(cv.is_sink_closed());
        let core: CoreError = cv.into();
        assert!(core.is_sink_closed());
    }

    #[test]
    fn test_core_field_errors_map_to_cv_kinds() {
        assert!(matches!(
            CvError::from(CoreError::MissingField("uri".to_string())),
            CvError::MissingField(_)
        ));
        assert!(matches!(
            CvError::from(CoreError::StateNotFound("face".to_string())),
            CvError::StateLookup(_)
        ));
    }
}
