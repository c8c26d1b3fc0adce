//! Library-agnostic image frames and their conversions.
//!
//! A [`RawData`] travels between plugins as a generic record
//! `{format, width, height, image}` and is turned into a native matrix only
//! at the point a vision routine needs one.

use crate::backend::VisionBackend;
use crate::error::CvError;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use streamcv_core::{Map, MapExt, Value};

pub const FORMAT_KEY: &str = "format";
pub const WIDTH_KEY: &str = "width";
pub const HEIGHT_KEY: &str = "height";
pub const IMAGE_KEY: &str = "image";

/// Pixel layout of a [`RawData`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Interleaved 3-channel BGR, `cv::Mat_<cv::Vec3b>`.
    CvMat,
    /// Interleaved 4-channel BGRA, `cv::Mat_<cv::Vec4b>`.
    CvMat4b,
    /// Opaque JPEG stream.
    Jpeg,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::CvMat => "cvmat",
            ImageFormat::CvMat4b => "cvmat4b",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    /// Bytes per pixel of packed formats.
    pub fn channels(&self) -> Option<usize> {
        match self {
            ImageFormat::CvMat => Some(3),
            ImageFormat::CvMat4b => Some(4),
            ImageFormat::Jpeg => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = CvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cvmat" => Ok(ImageFormat::CvMat),
            "cvmat4b" => Ok(ImageFormat::CvMat4b),
            "jpeg" => Ok(ImageFormat::Jpeg),
            other => Err(CvError::UnsupportedFormat(format!("'{}' is not supported", other))),
        }
    }
}

/// One decoded image frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawData {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

fn dimension(map: &Map, key: &str) -> Result<u32, CvError> {
    let value = map.to_int(key)?;
    u32::try_from(value).map_err(|_| CvError::TypeCoercion {
        field: key.to_string(),
        expected: "non-negative 32-bit int",
        actual: value.to_string(),
    })
}

impl RawData {
    pub fn new(format: ImageFormat, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            data,
        }
    }

    /// Parses a generic record. Buffer sizes are not checked here, see
    /// [`RawData::validate`].
    pub fn from_map(map: &Map) -> Result<Self, CvError> {
        let width = dimension(map, WIDTH_KEY)?;
        let height = dimension(map, HEIGHT_KEY)?;
        let data = map.get_blob(IMAGE_KEY)?.to_vec();
        let format = map.get_str(FORMAT_KEY)?.parse()?;
        Ok(Self {
            format,
            width,
            height,
            data,
        })
    }

    pub fn to_map(&self) -> Map {
        self.clone().into_map()
    }

    pub fn into_map(self) -> Map {
        let mut map = Map::with_capacity(4);
        map.insert(FORMAT_KEY.to_string(), Value::from(self.format.as_str()));
        map.insert(WIDTH_KEY.to_string(), Value::from(self.width));
        map.insert(HEIGHT_KEY.to_string(), Value::from(self.height));
        map.insert(IMAGE_KEY.to_string(), Value::Blob(self.data));
        map
    }

    /// Required buffer length for packed formats, `None` for JPEG.
    pub fn expected_len(&self) -> Result<Option<usize>, CvError> {
        let channels = match self.format.channels() {
            Some(c) => c,
            None => return Ok(None),
        };
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|p| p.checked_mul(channels))
            .map(Some)
            .ok_or_else(|| self.malformed(usize::MAX))
    }

    /// Checks that a packed buffer holds exactly `width * height * channels` bytes.
    pub fn validate(&self) -> Result<(), CvError> {
        match self.expected_len()? {
            Some(expected) if expected != self.data.len() => Err(self.malformed(expected)),
            _ => Ok(()),
        }
    }

    fn malformed(&self, expected: usize) -> CvError {
        CvError::MalformedBuffer {
            format: self.format,
            width: self.width,
            height: self.height,
            expected,
            actual: self.data.len(),
        }
    }

    /// Wraps a native BGR matrix. The result is always tagged `cvmat`.
    pub fn from_mat<B: VisionBackend + ?Sized>(backend: &B, mat: &B::Mat) -> Result<Self, CvError> {
        let (width, height, data) = backend.mat_to_bgr(mat)?;
        Ok(Self::new(ImageFormat::CvMat, width, height, data))
    }

    /// Builds a native BGR matrix from a `cvmat` frame.
    ///
    /// The pixels are always copied into memory owned by the backend, so the
    /// returned matrix may be mutated without affecting `self` or any record
    /// `self` was parsed from.
    pub fn to_mat<B: VisionBackend + ?Sized>(&self, backend: &B) -> Result<B::Mat, CvError> {
        match self.format {
            ImageFormat::CvMat => {}
            ImageFormat::CvMat4b | ImageFormat::Jpeg => {
                return Err(CvError::UnsupportedFormat(format!(
                    "'{}' cannot convert to a BGR matrix",
                    self.format
                )))
            }
        }
        self.validate()?;
        backend.mat_from_bgr(self.width, self.height, &self.data)
    }

    /// Reorders BGR / BGRA pixels into RGBA. BGR input gets an opaque alpha.
    pub fn to_rgba(&self) -> Result<Vec<u8>, CvError> {
        self.validate()?;
        let pixels = self.data.len() / self.format.channels().unwrap_or(1);
        let mut rgba = Vec::with_capacity(pixels * 4);
        match self.format {
            ImageFormat::CvMat => {
                for px in self.data.chunks_exact(3) {
                    rgba.extend_from_slice(&[px[2], px[1], px[0], 0xFF]);
                }
            }
            ImageFormat::CvMat4b => {
                for px in self.data.chunks_exact(4) {
                    rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                }
            }
            ImageFormat::Jpeg => {
                return Err(CvError::UnsupportedFormat(
                    "'jpeg' cannot convert to RGBA pixels".to_string(),
                ))
            }
        }
        Ok(rgba)
    }

    /// Encodes the frame as JPEG. JPEG frames are returned as-is.
    ///
    /// `quality` is clamped to `1..=100`. A frame with zero width or height
    /// still encodes to a complete baseline stream whose frame header carries
    /// the zero dimension. Most decoders reject such a header.
    pub fn to_jpeg(&self, quality: u8) -> Result<Cow<'_, [u8]>, CvError> {
        if self.format == ImageFormat::Jpeg {
            return Ok(Cow::Borrowed(&self.data));
        }
        let rgba = self.to_rgba()?;
        let image = RgbaImage::from_raw(self.width, self.height, rgba)
            .ok_or_else(|| self.malformed(self.data.len()))?;
        let rgb = DynamicImage::ImageRgba8(image).to_rgb8();

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
            rgb.as_raw(),
            self.width,
            self.height,
            ColorType::Rgb8,
        )?;
        Ok(Cow::Owned(out))
    }
}
