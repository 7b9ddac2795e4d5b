/// Pixel dimensions that detection results are rescaled to before drawing.
///
/// Derived from the live video's intrinsic resolution; the overlay surface
/// is always kept at exactly this size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Horizontal and vertical factors mapping `self` coordinates onto `target`.
    pub fn scale_to(&self, target: DisplaySize) -> (f64, f64) {
        if self.is_empty() {
            return (1.0, 1.0);
        }
        (
            target.width as f64 / self.width as f64,
            target.height as f64 / self.height as f64,
        )
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f64 && y < self.height as f64
    }
}

impl std::fmt::Display for DisplaySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_scale_to_larger_target() {
        let (sx, sy) = DisplaySize::new(320, 240).scale_to(DisplaySize::new(640, 360));
        assert_relative_eq!(sx, 2.0);
        assert_relative_eq!(sy, 1.5);
    }

    #[test]
    fn test_scale_from_empty_is_identity() {
        let (sx, sy) = DisplaySize::new(0, 240).scale_to(DisplaySize::new(640, 480));
        assert_relative_eq!(sx, 1.0);
        assert_relative_eq!(sy, 1.0);
    }

    #[rstest]
    #[case::origin(0.0, 0.0, true)]
    #[case::last_pixel(639.5, 479.5, true)]
    #[case::right_edge(640.0, 10.0, false)]
    #[case::negative(-1.0, 10.0, false)]
    fn test_contains(#[case] x: f64, #[case] y: f64, #[case] expected: bool) {
        assert_eq!(DisplaySize::new(640, 480).contains(x, y), expected);
    }

    #[test]
    fn test_display_format() {
        assert_eq!(DisplaySize::new(1280, 720).to_string(), "1280x720");
    }
}
