use crate::detection::domain::face_detection::FaceDetection;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::landmark_detector::LandmarkDetector;
use crate::shared::frame::Frame;

/// Decorator that replaces each detection's landmarks with those computed
/// by a dedicated landmark network.
///
/// A face whose landmark pass fails keeps the detector's own keypoints.
pub struct LandmarkAugmentedDetector {
    inner: Box<dyn FaceDetector>,
    landmarker: Box<dyn LandmarkDetector>,
}

impl LandmarkAugmentedDetector {
    pub fn new(inner: Box<dyn FaceDetector>, landmarker: Box<dyn LandmarkDetector>) -> Self {
        Self { inner, landmarker }
    }
}

impl FaceDetector for LandmarkAugmentedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>> {
        let faces = self.inner.detect(frame)?;
        let mut augmented = Vec::with_capacity(faces.len());
        for face in faces {
            match self.landmarker.landmarks(frame, &face.bbox) {
                Ok(lm) => augmented.push(face.with_landmarks(lm)),
                Err(e) => {
                    log::debug!("Landmark pass failed for face at {:?}: {e}", face.bbox);
                    augmented.push(face);
                }
            }
        }
        Ok(augmented)
    }
}
