/// Straight (non-premultiplied) RGBA colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);
    pub const CYAN: Rgba = Rgba([0, 255, 255, 255]);
    pub const MAGENTA: Rgba = Rgba([255, 0, 255, 255]);
}

/// How landmarks are rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawLandmarksOptions {
    pub draw_lines: bool,
    pub draw_points: bool,
    pub line_width: u32,
    pub line_color: Rgba,
    pub point_size: u32,
    pub point_color: Rgba,
}

impl Default for DrawLandmarksOptions {
    fn default() -> Self {
        Self {
            draw_lines: true,
            draw_points: true,
            line_width: 1,
            line_color: Rgba::CYAN,
            point_size: 2,
            point_color: Rgba::MAGENTA,
        }
    }
}
