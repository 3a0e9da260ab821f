//! Screen capture with optional region restriction.
//!
//! The screen itself is a collaborator behind [`ScreenSource`]; this module
//! wraps it into [`Frame`]s that carry the offset needed to translate
//! raster-local match coordinates back into absolute screen coordinates.

use image::GrayImage;

use crate::config::Region;
use crate::errors::DetectorResult;

/// Read-only access to screen pixels.
pub trait ScreenSource: Send + Sync {
    /// Captures the given absolute-coordinate rectangle as a grayscale
    /// raster, or the full primary screen when `region` is `None`.
    fn capture(&self, region: Option<&Region>) -> DetectorResult<GrayImage>;
}

/// A captured raster plus the screen position of its top-left corner.
#[derive(Clone, Debug)]
pub struct Frame {
    pub raster: GrayImage,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Frame {
    /// Converts raster-local coordinates to absolute screen coordinates.
    pub fn to_absolute(&self, x: u32, y: u32) -> (i32, i32) {
        (self.offset_x + x as i32, self.offset_y + y as i32)
    }
}

/// Captures one frame for a detection cycle.
///
/// With a region configured, exactly that rectangle is captured and its
/// top-left corner becomes the frame offset; otherwise the full screen is
/// captured with offset (0, 0).
pub fn grab(screen: &dyn ScreenSource, region: Option<&Region>) -> DetectorResult<Frame> {
    let raster = screen.capture(region)?;
    let (offset_x, offset_y) = match region {
        Some(r) => (r.x, r.y),
        None => (0, 0),
    };
    Ok(Frame {
        raster,
        offset_x,
        offset_y,
    })
}

/// Primary-monitor capture via `xcap`.
#[cfg(feature = "desktop")]
pub struct XcapScreen;

#[cfg(feature = "desktop")]
impl ScreenSource for XcapScreen {
    fn capture(&self, region: Option<&Region>) -> DetectorResult<GrayImage> {
        use crate::errors::DetectorError;

        let monitors =
            xcap::Monitor::all().map_err(|e| DetectorError::Capture(e.to_string()))?;
        let monitor = monitors
            .into_iter()
            .next()
            .ok_or_else(|| DetectorError::Capture("no monitor found".into()))?;
        let shot = monitor
            .capture_image()
            .map_err(|e| DetectorError::Capture(e.to_string()))?;
        let full = image::DynamicImage::ImageRgba8(shot);

        let gray = match region {
            Some(r) => full
                .crop_imm(r.x.max(0) as u32, r.y.max(0) as u32, r.width, r.height)
                .to_luma8(),
            None => full.to_luma8(),
        };
        Ok(gray)
    }
}
