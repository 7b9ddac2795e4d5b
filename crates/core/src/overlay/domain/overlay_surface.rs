use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::overlay::domain::draw_options::DrawLandmarksOptions;
use crate::shared::display_size::DisplaySize;

/// A 2D drawing surface stacked over the video.
///
/// Drawing outside the surface is clipped.
pub trait OverlaySurface: Send {
    fn size(&self) -> DisplaySize;

    /// Resizes the surface to `size`, discarding its contents.
    fn match_dimensions(&mut self, size: DisplaySize);

    fn clear(&mut self);

    fn draw_face_landmarks(&mut self, landmarks: &FaceLandmarks, options: &DrawLandmarksOptions);
}
