//! Seam between the adapter and the native vision library.
//!
//! Every native resource (capture handle, matrix, classifier, overlay) is an
//! owned value released by `Drop`, so it is freed on every exit path.

#[cfg(feature = "opencv")]
pub mod opencv;

use crate::error::CvError;
use crate::rect::Rect;
use std::path::Path;

/// Capture settings that can be overridden on an opened device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureProperty {
    FrameWidth,
    FrameHeight,
    Fps,
}

/// An opened video capture handle.
pub trait Capture: Send {
    type Mat;

    /// Reads the next frame. `Ok(None)` means no frame could be read.
    fn read(&mut self) -> Result<Option<Self::Mat>, CvError>;

    /// Advances past `frames` frames without decoding them.
    fn grab(&mut self, frames: u32) -> Result<(), CvError>;

    /// Returns whether the device accepted the value.
    fn set(&mut self, property: CaptureProperty, value: f64) -> Result<bool, CvError>;
}

pub trait VisionBackend: Send + Sync + 'static {
    /// 3-channel BGR matrix.
    type Mat: Send + 'static;
    /// 4-channel BGRA overlay image.
    type AlphaMat: Send + 'static;
    type Classifier: Send + 'static;
    type Capture: Capture<Mat = Self::Mat> + 'static;

    fn open_device(&self, device_id: i32) -> Result<Self::Capture, CvError>;
    fn open_uri(&self, uri: &str) -> Result<Self::Capture, CvError>;

    /// Copies `data` into a newly allocated matrix that never aliases it.
    /// `data` is exactly `width * height * 3` bytes.
    fn mat_from_bgr(&self, width: u32, height: u32, data: &[u8]) -> Result<Self::Mat, CvError>;
    fn mat_to_bgr(&self, mat: &Self::Mat) -> Result<(u32, u32, Vec<u8>), CvError>;
    fn mat_is_empty(&self, mat: &Self::Mat) -> bool;

    fn load_classifier(&self, path: &Path) -> Result<Self::Classifier, CvError>;
    /// A classifier without stages detects nothing.
    fn detect_multi_scale(
        &self,
        classifier: &mut Self::Classifier,
        mat: &Self::Mat,
    ) -> Result<Vec<Rect>, CvError>;
    fn draw_rects(&self, mat: &mut Self::Mat, rects: &[Rect]) -> Result<(), CvError>;

    fn load_alpha_image(&self, path: &Path) -> Result<Self::AlphaMat, CvError>;
    /// Composites `overlay`, scaled to each rect, onto `back`.
    fn mount_alpha_image(
        &self,
        overlay: &Self::AlphaMat,
        back: &mut Self::Mat,
        rects: &[Rect],
    ) -> Result<(), CvError>;
}

/// Alpha-blends a BGRA `overlay` sized `rect.width` x `rect.height` onto a
/// packed BGR frame at `rect`, clipped to the frame.
pub fn blend_bgra_onto_bgr(back: &mut [u8], width: u32, height: u32, overlay: &[u8], rect: &Rect) {
    let clipped = match rect.clip(width, height) {
        Some(c) => c,
        None => return,
    };
    let ow = rect.width as usize;
    for y in clipped.y..clipped.y + clipped.height {
        let oy = (y - rect.y) as usize;
        for x in clipped.x..clipped.x + clipped.width {
            let ox = (x - rect.x) as usize;
            let o = (oy * ow + ox) * 4;
            let b = (y as usize * width as usize + x as usize) * 3;
            if o + 3 >= overlay.len() || b + 2 >= back.len() {
                continue;
            }
            let alpha = u32::from(overlay[o + 3]);
            for c in 0..3 {
                let fg = u32::from(overlay[o + c]);
                let bg = u32::from(back[b + c]);
                back[b + c] = ((fg * alpha + bg * (255 - alpha) + 127) / 255) as u8;
            }
        }
    }
}

/// Draws a one pixel `bgr` outline of `rect` onto a packed BGR frame.
pub fn outline_bgr(back: &mut [u8], width: u32, height: u32, rect: &Rect, bgr: [u8; 3]) {
    if rect.width <= 0 || rect.height <= 0 {
        return;
    }
    let x1 = i64::from(rect.x) + i64::from(rect.width) - 1;
    let y1 = i64::from(rect.y) + i64::from(rect.height) - 1;
    let mut put = |x: i64, y: i64| {
        if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
            return;
        }
        let i = (y as usize * width as usize + x as usize) * 3;
        if i + 2 < back.len() {
            back[i..i + 3].copy_from_slice(&bgr);
        }
    };
    for x in i64::from(rect.x)..=x1 {
        put(x, i64::from(rect.y));
        put(x, y1);
    }
    for y in i64::from(rect.y)..=y1 {
        put(i64::from(rect.x), y);
        put(x1, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_opaque_and_transparent() {
        let mut back = vec![0u8; 2 * 2 * 3];
        // left column opaque white, right column transparent
        let overlay = vec![
            255, 255, 255, 255, 9, 9, 9, 0, //
            255, 255, 255, 255, 9, 9, 9, 0,
        ];
        blend_bgra_onto_bgr(&mut back, 2, 2, &overlay, &Rect::new(0, 0, 2, 2));
        assert_eq!(&back[0..3], &[255, 255, 255]);
        assert_eq!(&back[3..6], &[0, 0, 0]);
        assert_eq!(&back[6..9], &[255, 255, 255]);
    }

    #[test]
    fn test_blend_clips_outside_frame() {
        let mut back = vec![10u8; 2 * 2 * 3];
        let overlay = [200, 200, 200, 255].repeat(9);
        blend_bgra_onto_bgr(&mut back, 2, 2, &overlay, &Rect::new(1, 1, 3, 3));
        assert_eq!(&back[0..9], &[10; 9]);
        assert_eq!(&back[9..12], &[200, 200, 200]);
    }

    #[test]
    fn test_outline() {
        let mut back = vec![0u8; 3 * 3 * 3];
        outline_bgr(&mut back, 3, 3, &Rect::new(0, 0, 3, 3), [1, 2, 3]);
        // centre pixel untouched
        assert_eq!(&back[12..15], &[0, 0, 0]);
        assert_eq!(&back[0..3], &[1, 2, 3]);
        assert_eq!(&back[24..27], &[1, 2, 3]);
    }

    #[test]
    fn test_outline_out_of_bounds_is_ignored() {
        let mut back = vec![0u8; 2 * 2 * 3];
        outline_bgr(&mut back, 2, 2, &Rect::new(5, 5, 3, 3), [1, 1, 1]);
        assert!(back.iter().all(|&b| b == 0));
    }
}
