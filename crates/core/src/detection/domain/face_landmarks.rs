//! Facial keypoints and the contour groups used to draw them.
//!
//! The 68-point layout follows the iBUG 300-W annotation; sparse layouts
//! come straight from detector keypoint heads.

use std::ops::Range;

/// Point ordering produced by a detector or landmark network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LandmarkLayout {
    /// Eyes, nose tip, mouth corners (YOLO face-pose head).
    FivePoint,
    /// Eyes, nose tip, mouth centre, ear tragions (BlazeFace).
    SixPoint,
    /// Full iBUG 68-point annotation.
    SixtyEight,
}

impl LandmarkLayout {
    pub fn point_count(self) -> usize {
        match self {
            LandmarkLayout::FivePoint => 5,
            LandmarkLayout::SixPoint => 6,
            LandmarkLayout::SixtyEight => 68,
        }
    }

    /// Contours drawn as connected polylines: `(index range, closed)`.
    ///
    /// Sparse layouts have no contours and are drawn as points only.
    pub fn contours(self) -> &'static [(Range<usize>, bool)] {
        match self {
            LandmarkLayout::SixtyEight => &CONTOURS_68,
            _ => &[],
        }
    }
}

static CONTOURS_68: [(Range<usize>, bool); 9] = [
    (0..17, false),  // jaw
    (17..22, false), // left brow
    (22..27, false), // right brow
    (27..31, false), // nose bridge
    (31..36, false), // lower nose
    (36..42, true),  // left eye
    (42..48, true),  // right eye
    (48..60, true),  // outer lips
    (60..68, true),  // inner lips
];

/// Landmarks for a single face in some coordinate space.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    layout: LandmarkLayout,
    /// `None` marks a keypoint the detector was not confident about.
    points: Vec<Option<(f64, f64)>>,
}

impl FaceLandmarks {
    /// Builds landmarks from raw points; the length must match the layout.
    pub fn new(
        layout: LandmarkLayout,
        points: Vec<Option<(f64, f64)>>,
    ) -> Result<Self, &'static str> {
        if points.len() != layout.point_count() {
            return Err("Point count does not match landmark layout");
        }
        Ok(Self { layout, points })
    }

    /// Convenience constructor for layouts where every point is visible.
    pub fn from_points(layout: LandmarkLayout, points: &[(f64, f64)]) -> Result<Self, &'static str> {
        Self::new(layout, points.iter().copied().map(Some).collect())
    }

    pub fn layout(&self) -> LandmarkLayout {
        self.layout
    }

    pub fn points(&self) -> &[Option<(f64, f64)>] {
        &self.points
    }

    pub fn visible(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().flatten().copied()
    }

    pub fn has_visible(&self) -> bool {
        self.points.iter().any(Option::is_some)
    }

    /// Rescales every point by independent x and y factors.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            layout: self.layout,
            points: self
                .points
                .iter()
                .map(|p| p.map(|(x, y)| (x * sx, y * sy)))
                .collect(),
        }
    }

    /// Polylines to draw, with invisible points splitting a contour.
    pub fn polylines(&self) -> Vec<(Vec<(f64, f64)>, bool)> {
        let mut lines = Vec::new();
        for (range, closed) in self.layout.contours() {
            let segment = &self.points[range.clone()];
            if segment.iter().all(Option::is_some) {
                lines.push((segment.iter().flatten().copied().collect(), *closed));
                continue;
            }
            let mut run = Vec::new();
            for p in segment {
                match p {
                    Some(pt) => run.push(*pt),
                    None if run.len() > 1 => lines.push((std::mem::take(&mut run), false)),
                    None => run.clear(),
                }
            }
            if run.len() > 1 {
                lines.push((run, false));
            }
        }
        lines
    }
}
