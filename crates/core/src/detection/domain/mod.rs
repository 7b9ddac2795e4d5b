pub mod face_detection;
pub mod face_detector;
pub mod face_landmarks;
pub mod landmark_detector;
