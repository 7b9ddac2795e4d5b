use crate::detection::domain::face_detection::BoundingBox;
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::frame::Frame;

/// Computes dense landmarks for one face box within a frame.
pub trait LandmarkDetector: Send {
    fn landmarks(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<FaceLandmarks, Box<dyn std::error::Error>>;
}
