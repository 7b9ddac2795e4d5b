use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::display_size::DisplaySize;

/// Axis-aligned face box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1,
            y: y1,
            width: (x2 - x1).max(0.0),
            height: (y2 - y1).max(0.0),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

/// One detected face, optionally augmented with landmarks.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub score: f64,
    pub landmarks: Option<FaceLandmarks>,
}

impl FaceDetection {
    pub fn new(bbox: BoundingBox, score: f64) -> Self {
        Self {
            bbox,
            score,
            landmarks: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: FaceLandmarks) -> Self {
        self.landmarks = Some(landmarks);
        self
    }
}

/// Rescales detections computed on a `from`-sized frame to `to`.
pub fn resize_results(
    detections: Vec<FaceDetection>,
    from: DisplaySize,
    to: DisplaySize,
) -> Vec<FaceDetection> {
    if from == to {
        return detections;
    }
    let (sx, sy) = from.scale_to(to);
    detections
        .into_iter()
        .map(|d| FaceDetection {
            bbox: d.bbox.scaled(sx, sy),
            score: d.score,
            landmarks: d.landmarks.map(|lm| lm.scaled(sx, sy)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_landmarks::LandmarkLayout;
    use approx::assert_relative_eq;

    fn detection() -> FaceDetection {
        let lm = FaceLandmarks::from_points(
            LandmarkLayout::FivePoint,
            &[(40.0, 40.0), (60.0, 40.0), (50.0, 50.0), (42.0, 60.0), (58.0, 60.0)],
        )
        .unwrap();
        FaceDetection::new(BoundingBox::from_corners(30.0, 30.0, 70.0, 80.0), 0.9).with_landmarks(lm)
    }

    #[test]
    fn test_from_corners_never_negative() {
        let b = BoundingBox::from_corners(10.0, 10.0, 5.0, 5.0);
        assert_eq!(b.width, 0.0);
        assert_eq!(b.height, 0.0);
    }

    #[test]
    fn test_resize_results_identity_when_sizes_match() {
        let size = DisplaySize::new(320, 240);
        let out = resize_results(vec![detection()], size, size);
        assert_eq!(out, vec![detection()]);
    }

    #[test]
    fn test_resize_results_scales_boxes_and_landmarks() {
        let out = resize_results(
            vec![detection()],
            DisplaySize::new(100, 100),
            DisplaySize::new(200, 50),
        );
        let d = &out[0];
        assert_relative_eq!(d.bbox.x, 60.0);
        assert_relative_eq!(d.bbox.height, 25.0);
        assert_relative_eq!(d.score, 0.9);
        let (x, y) = d.landmarks.as_ref().unwrap().points()[2].unwrap();
        assert_relative_eq!(x, 100.0);
        assert_relative_eq!(y, 25.0);
    }

    #[test]
    fn test_resize_results_empty() {
        let out = resize_results(vec![], DisplaySize::new(1, 1), DisplaySize::new(2, 2));
        assert!(out.is_empty());
    }
}
