use std::path::Path;

use image::RgbaImage;

use crate::shared::frame::Frame;

/// Composites the overlay over a video frame and writes the result as an
/// image file (format from the extension).
pub struct SnapshotWriter;

impl SnapshotWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write(
        &self,
        path: &Path,
        frame: &Frame,
        overlay: &RgbaImage,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let composed = compose(frame, overlay)?;
        composed.save(path)?;
        Ok(())
    }
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Alpha-blends `overlay` onto `frame`. The overlay is stretched with
/// nearest-neighbour sampling if the sizes differ.
pub fn compose(frame: &Frame, overlay: &RgbaImage) -> Result<image::RgbImage, Box<dyn std::error::Error>> {
    let mut out = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or("Failed to create image from frame data")?;
    let (ow, oh) = overlay.dimensions();
    if ow == 0 || oh == 0 {
        return Ok(out);
    }
    let (fw, fh) = out.dimensions();

    for (x, y, px) in out.enumerate_pixels_mut() {
        let ox = (x as u64 * ow as u64 / fw as u64) as u32;
        let oy = (y as u64 * oh as u64 / fh as u64) as u32;
        let [r, g, b, a] = overlay.get_pixel(ox, oy).0;
        if a == 0 {
            continue;
        }
        let alpha = a as u32;
        for (dst, src) in px.0.iter_mut().zip([r, g, b]) {
            *dst = ((src as u32 * alpha + *dst as u32 * (255 - alpha)) / 255) as u8;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_opaque_overlay_replaces_pixel() {
        let frame = Frame::filled(4, 4, [10, 10, 10], 0);
        let mut overlay = RgbaImage::new(4, 4);
        overlay.put_pixel(1, 2, image::Rgba([255, 0, 255, 255]));
        let out = compose(&frame, &overlay).unwrap();
        assert_eq!(out.get_pixel(1, 2).0, [255, 0, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [10, 10, 10]);
    }

    #[test]
    fn test_compose_half_alpha_blends() {
        let frame = Frame::filled(1, 1, [0, 0, 0], 0);
        let mut overlay = RgbaImage::new(1, 1);
        overlay.put_pixel(0, 0, image::Rgba([255, 255, 255, 128]));
        let out = compose(&frame, &overlay).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [128, 128, 128]);
    }

    #[test]
    fn test_compose_stretches_smaller_overlay() {
        let frame = Frame::filled(4, 4, [0, 0, 0], 0);
        let mut overlay = RgbaImage::new(2, 2);
        overlay.put_pixel(1, 1, image::Rgba([0, 255, 0, 255]));
        let out = compose(&frame, &overlay).unwrap();
        assert_eq!(out.get_pixel(3, 3).0, [0, 255, 0]);
        assert_eq!(out.get_pixel(1, 1).0, [0, 0, 0]);
    }

    #[test]
    fn test_write_creates_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snap.png");
        let frame = Frame::filled(8, 6, [50, 60, 70], 0);
        SnapshotWriter::new()
            .write(&path, &frame, &RgbaImage::new(8, 6))
            .unwrap();
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (8, 6));
        assert_eq!(img.get_pixel(0, 0).0, [50, 60, 70]);
    }
}
