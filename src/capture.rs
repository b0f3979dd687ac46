//! Screen capturer: turns a screen-space CSS rectangle into a cropped JPEG
//! at the display's native resolution.
//!
//! `capture` talks to the OS and blocks; the session runs it through
//! `spawn_blocking` and treats every error as a skipped tick.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use log::debug;
use thiserror::Error;
use xcap::Monitor;

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no display available")]
    NoDisplay,
    #[error("captured image was empty")]
    EmptyFrame,
    #[error("crop region has no visible area")]
    InvalidGeometry,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Screen-space rectangle in CSS pixels, as reported by the sensor.
#[derive(Debug, Clone, Copy)]
pub struct CaptureRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// One cropped JPEG plus its clamped pixel dimensions.
#[derive(Clone)]
pub struct Frame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("jpeg_bytes", &self.jpeg.len())
            .finish()
    }
}

/// Most recent capture, kept for the debug-save hotkey. Written by the
/// session, read by the hotkey handler.
pub type LastFrame = Arc<Mutex<Option<Frame>>>;

/// Map a CSS-pixel rect into pixel coordinates of the acquired image and
/// clamp it inside. `scale` is the display's physical scale factor;
/// `thumb_x`/`thumb_y` correct for a pixel source that is not exactly
/// physical-sized.
fn crop_pixels(
    rect: CaptureRect,
    scale: f64,
    thumb_x: f64,
    thumb_y: f64,
    image_w: u32,
    image_h: u32,
) -> Result<(u32, u32, u32, u32), CaptureError> {
    let to_px = |v: f64, axis_scale: f64| (v * scale * axis_scale).round();
    let clamp = |v: f64, max: u32| v.max(0.0).min(max as f64) as u32;

    let x0 = clamp(to_px(rect.x, thumb_x), image_w);
    let y0 = clamp(to_px(rect.y, thumb_y), image_h);
    let x1 = clamp(to_px(rect.x + rect.w, thumb_x), image_w);
    let y1 = clamp(to_px(rect.y + rect.h, thumb_y), image_h);

    if x1 <= x0 || y1 <= y0 {
        return Err(CaptureError::InvalidGeometry);
    }
    Ok((x0, y0, x1 - x0, y1 - y0))
}

/// Capture the post rectangle from the primary display. `dpr` is the ratio
/// the browser observed; the display's own scale factor is authoritative and
/// a mismatch is only worth a debug line.
pub fn capture(rect: CaptureRect, dpr: f64) -> Result<Frame, CaptureError> {
    let monitor = Monitor::all()
        .map_err(|err| CaptureError::Other(anyhow!("monitor enumeration failed: {err}")))?
        .into_iter()
        .next()
        .ok_or(CaptureError::NoDisplay)?;

    let scale = monitor.scale_factor() as f64;
    if (scale - dpr).abs() > 0.01 {
        debug!("display scale {scale} differs from sensor dpr {dpr}");
    }

    let image = monitor
        .capture_image()
        .map_err(|err| CaptureError::Other(anyhow!("screen capture failed: {err}")))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(CaptureError::EmptyFrame);
    }

    // The pixel source is nominally physical-sized; compute the actual ratio
    // in case the OS hands back something else.
    let physical_w = monitor.width() as f64 * scale;
    let physical_h = monitor.height() as f64 * scale;
    let thumb_x = if physical_w > 0.0 { image.width() as f64 / physical_w } else { 1.0 };
    let thumb_y = if physical_h > 0.0 { image.height() as f64 / physical_h } else { 1.0 };

    let (x, y, w, h) = crop_pixels(rect, scale, thumb_x, thumb_y, image.width(), image.height())?;
    let cropped = image::imageops::crop_imm(&image, x, y, w, h).to_image();

    let rgb = DynamicImage::ImageRgba8(cropped).to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut Cursor::new(&mut jpeg), JPEG_QUALITY)
        .encode_image(&rgb)
        .context("jpeg encoding failed")?;

    Ok(Frame {
        jpeg,
        width: w,
        height: h,
    })
}

/// Write the most recent capture to the debug directory. Used by the
/// CmdOrCtrl+Shift+S hotkey; never touches session state.
pub fn save_debug_frame(last: &LastFrame, dir: &Path) -> anyhow::Result<PathBuf> {
    let frame = last
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
        .ok_or_else(|| anyhow!("no capture buffered yet"))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create debug dir {}", dir.display()))?;
    let path = dir.join(format!(
        "debug_{}_{}x{}.jpg",
        chrono::Utc::now().timestamp_millis(),
        frame.width,
        frame.height
    ));
    std::fs::write(&path, &frame.jpeg)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_scales_into_physical_pixels() {
        let rect = CaptureRect { x: 100.0, y: 100.0, w: 400.0, h: 800.0 };
        let (x, y, w, h) = crop_pixels(rect, 2.0, 1.0, 1.0, 3840, 2160).unwrap();
        assert_eq!((x, y, w, h), (200, 200, 800, 1600));
    }

    #[test]
    fn negative_origin_clamps_to_a_positive_area() {
        let rect = CaptureRect { x: -50.0, y: 10.0, w: 200.0, h: 100.0 };
        let (x, y, w, h) = crop_pixels(rect, 1.0, 1.0, 1.0, 1920, 1080).unwrap();
        assert_eq!(x, 0);
        assert_eq!(y, 10);
        assert_eq!(w, 150);
        assert_eq!(h, 100);
    }

    #[test]
    fn overhang_on_the_right_edge_clamps() {
        let rect = CaptureRect { x: 1800.0, y: 0.0, w: 400.0, h: 100.0 };
        let (x, _, w, _) = crop_pixels(rect, 1.0, 1.0, 1.0, 1920, 1080).unwrap();
        assert_eq!(x, 1800);
        assert_eq!(w, 120);
    }

    #[test]
    fn fully_off_screen_is_invalid_geometry() {
        let rect = CaptureRect { x: -500.0, y: 0.0, w: 400.0, h: 100.0 };
        assert!(matches!(
            crop_pixels(rect, 1.0, 1.0, 1.0, 1920, 1080),
            Err(CaptureError::InvalidGeometry)
        ));
        let rect = CaptureRect { x: 0.0, y: 0.0, w: 0.0, h: 100.0 };
        assert!(matches!(
            crop_pixels(rect, 2.0, 1.0, 1.0, 1920, 1080),
            Err(CaptureError::InvalidGeometry)
        ));
    }

    #[test]
    fn thumb_scale_corrects_undersized_sources() {
        // Source image is half the physical size on both axes.
        let rect = CaptureRect { x: 100.0, y: 100.0, w: 400.0, h: 800.0 };
        let (x, y, w, h) = crop_pixels(rect, 2.0, 0.5, 0.5, 1920, 1080).unwrap();
        assert_eq!((x, y, w, h), (100, 100, 400, 800));
    }

    #[test]
    #[ignore = "requires a display and screen recording permission"]
    fn captures_a_real_region() {
        let rect = CaptureRect { x: 0.0, y: 0.0, w: 200.0, h: 200.0 };
        let frame = capture(rect, 1.0).expect("capture failed");
        assert!(frame.width > 0 && frame.height > 0);
        assert!(frame.jpeg.len() > 1000);
    }
}
