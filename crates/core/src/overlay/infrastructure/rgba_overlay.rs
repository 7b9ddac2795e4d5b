use image::RgbaImage;

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::overlay::domain::draw_options::{DrawLandmarksOptions, Rgba};
use crate::overlay::domain::overlay_surface::OverlaySurface;
use crate::shared::display_size::DisplaySize;

/// Transparent RGBA canvas backed by an [`RgbaImage`].
///
/// Pixels are written, not blended: the surface only ever holds the
/// landmarks of the latest tick over a transparent background.
pub struct RgbaOverlay {
    canvas: RgbaImage,
}

impl RgbaOverlay {
    pub fn new(size: DisplaySize) -> Self {
        Self {
            canvas: RgbaImage::new(size.width, size.height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn pixels(&self) -> &[u8] {
        self.canvas.as_raw()
    }

    /// Number of non-transparent pixels.
    pub fn painted_pixels(&self) -> usize {
        self.canvas.pixels().filter(|p| p.0[3] != 0).count()
    }

    fn put(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 || x >= self.canvas.width() as i64 || y >= self.canvas.height() as i64 {
            return;
        }
        self.canvas.put_pixel(x as u32, y as u32, image::Rgba(color.0));
    }

    /// Square brush of side `width` centred on `(x, y)`.
    fn stamp(&mut self, x: i64, y: i64, width: u32, color: Rgba) {
        let w = width.max(1) as i64;
        let lo = -(w - 1) / 2;
        for dy in lo..lo + w {
            for dx in lo..lo + w {
                self.put(x + dx, y + dy, color);
            }
        }
    }

    /// Bresenham line between two points. The segment is clipped to the
    /// canvas before it is walked.
    fn line(&mut self, from: (f64, f64), to: (f64, f64), width: u32, color: Rgba) {
        let margin = width.max(1) as f64;
        let bounds = (
            -margin,
            -margin,
            self.canvas.width() as f64 + margin,
            self.canvas.height() as f64 + margin,
        );
        let Some((from, to)) = clip_segment(from, to, bounds) else {
            return;
        };
        let (mut x0, mut y0) = (from.0.round() as i64, from.1.round() as i64);
        let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.stamp(x0, y0, width, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Filled disc of the given radius.
    fn disc(&mut self, center: (f64, f64), radius: u32, color: Rgba) {
        let r = radius as i64;
        let reach = r as f64 + 1.0;
        let inside = center.0.is_finite()
            && center.1.is_finite()
            && center.0 > -reach
            && center.1 > -reach
            && center.0 < self.canvas.width() as f64 + reach
            && center.1 < self.canvas.height() as f64 + reach;
        if !inside {
            return;
        }
        let (cx, cy) = (center.0.round() as i64, center.1.round() as i64);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.put(cx + dx, cy + dy, color);
                }
            }
        }
    }
}

impl OverlaySurface for RgbaOverlay {
    fn size(&self) -> DisplaySize {
        DisplaySize::new(self.canvas.width(), self.canvas.height())
    }

    fn match_dimensions(&mut self, size: DisplaySize) {
        if self.size() != size {
            self.canvas = RgbaImage::new(size.width, size.height);
        }
    }

    fn clear(&mut self) {
        for p in self.canvas.pixels_mut() {
            *p = image::Rgba(Rgba::TRANSPARENT.0);
        }
    }

    fn draw_face_landmarks(&mut self, landmarks: &FaceLandmarks, options: &DrawLandmarksOptions) {
        if options.draw_lines {
            for (points, closed) in landmarks.polylines() {
                for pair in points.windows(2) {
                    self.line(pair[0], pair[1], options.line_width, options.line_color);
                }
                if closed && points.len() > 2 {
                    self.line(
                        points[points.len() - 1],
                        points[0],
                        options.line_width,
                        options.line_color,
                    );
                }
            }
        }
        if options.draw_points {
            for point in landmarks.visible() {
                self.disc(point, options.point_size, options.point_color);
            }
        }
    }
}

/// Liang-Barsky clip of a segment to `(min_x, min_y, max_x, max_y)`.
/// `None` when the segment misses the box or has a non-finite end.
fn clip_segment(
    from: (f64, f64),
    to: (f64, f64),
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [
        (-dx, from.0 - min_x),
        (dx, max_x - from.0),
        (-dy, from.1 - min_y),
        (dy, max_y - from.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((
        (from.0 + t0 * dx, from.1 + t0 * dy),
        (from.0 + t1 * dx, from.1 + t1 * dy),
    ))
}
