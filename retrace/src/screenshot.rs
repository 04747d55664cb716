use image::imageops;
use tracing::{debug, instrument};

use crate::{Bitmap, DesktopError};

/// Source of screen pixels. Implementations must be usable from the capture
/// thread and from playback tasks at the same time.
pub trait ScreenshotProvider: Send + Sync {
    /// Capture a `width` x `height` region whose top-left corner is `(x, y)`
    /// in global screen coordinates.
    fn capture_region(
        &self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Result<Bitmap, DesktopError>;

    fn capture_active_window(&self) -> Result<Bitmap, DesktopError>;

    fn capture_fullscreen(&self) -> Result<Bitmap, DesktopError>;
}

/// Top-left corner of a `width` x `height` region centered on `(x, y)`,
/// clamped so it never starts left of or above the origin.
pub fn centered_region(x: i32, y: i32, width: u32, height: u32) -> (i32, i32) {
    let left = (x - (width / 2) as i32).max(0);
    let top = (y - (height / 2) as i32).max(0);
    (left, top)
}

/// Clamp a region given in monitor-local coordinates to the monitor bounds.
/// Returns `None` when nothing of the region is visible.
fn clamp_to_bounds(
    left: i32,
    top: i32,
    width: u32,
    height: u32,
    bounds_width: u32,
    bounds_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let x = left.max(0) as u32;
    let y = top.max(0) as u32;
    if x >= bounds_width || y >= bounds_height {
        return None;
    }
    let w = width.min(bounds_width - x);
    let h = height.min(bounds_height - y);
    if w == 0 || h == 0 {
        return None;
    }
    Some((x, y, w, h))
}

/// [`ScreenshotProvider`] backed by `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapScreenshots;

impl XcapScreenshots {
    pub fn new() -> Self {
        Self
    }

    fn primary_monitor() -> Result<xcap::Monitor, DesktopError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| DesktopError::PlatformError(format!("Failed to get monitors: {e}")))?;
        for monitor in monitors {
            match monitor.is_primary() {
                Ok(true) => return Ok(monitor),
                Ok(false) => continue,
                Err(e) => {
                    return Err(DesktopError::PlatformError(format!(
                        "Error checking monitor primary status: {e}"
                    )));
                }
            }
        }
        Err(DesktopError::PlatformError(
            "Could not find primary monitor".to_string(),
        ))
    }
}

impl ScreenshotProvider for XcapScreenshots {
    #[instrument(level = "debug", skip(self))]
    fn capture_region(
        &self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Result<Bitmap, DesktopError> {
        let monitor = xcap::Monitor::from_point(x.max(0), y.max(0)).or_else(|e| {
            debug!("no monitor at ({x}, {y}): {e}; falling back to primary");
            Self::primary_monitor()
        })?;
        let origin_x = monitor.x()?;
        let origin_y = monitor.y()?;

        let frame = monitor.capture_image().map_err(|e| {
            DesktopError::PlatformError(format!("Failed to capture screen: {e}"))
        })?;

        let (cx, cy, cw, ch) = clamp_to_bounds(
            x - origin_x,
            y - origin_y,
            width,
            height,
            frame.width(),
            frame.height(),
        )
        .ok_or_else(|| {
            DesktopError::InvalidArgument(format!(
                "region {width}x{height} at ({x}, {y}) is outside the screen"
            ))
        })?;

        let region = imageops::crop_imm(&frame, cx, cy, cw, ch).to_image();
        Ok(Bitmap::new(region))
    }

    #[instrument(level = "debug", skip(self))]
    fn capture_active_window(&self) -> Result<Bitmap, DesktopError> {
        let windows = xcap::Window::all()
            .map_err(|e| DesktopError::PlatformError(format!("Failed to get windows: {e}")))?;

        let focused = windows
            .iter()
            .find(|w| w.is_focused().unwrap_or(false))
            .ok_or_else(|| DesktopError::NoActiveWindow("No focused window found".to_string()))?;

        let image = focused.capture_image().map_err(|e| {
            DesktopError::PlatformError(format!("Failed to capture window: {e}"))
        })?;
        Ok(Bitmap::new(image))
    }

    #[instrument(level = "debug", skip(self))]
    fn capture_fullscreen(&self) -> Result<Bitmap, DesktopError> {
        let image = Self::primary_monitor()?.capture_image().map_err(|e| {
            DesktopError::PlatformError(format!("Failed to capture screen: {e}"))
        })?;
        Ok(Bitmap::new(image))
    }
}
