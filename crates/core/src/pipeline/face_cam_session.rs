use std::sync::Arc;
use std::time::Duration;

use crate::camera::domain::camera_controller::CameraController;
use crate::camera::domain::camera_error::CameraError;
use crate::camera::domain::video_sink::VideoSink;
use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::detection_loop::{DetectionLoop, DetectionLoopError, SharedOverlay};
use crate::shared::constants::METADATA_TIMEOUT;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Detection(#[from] DetectionLoopError),
}

/// Owns the camera, the detection loop and the loaded detector.
///
/// The only place the camera-active and detection-running states change.
/// Dropping the session stops detection, then the camera.
pub struct FaceCamSession {
    camera: CameraController,
    detection: DetectionLoop,
    ready_timeout: Duration,
}

impl FaceCamSession {
    pub fn new(camera: CameraController, detection: DetectionLoop) -> Self {
        Self {
            camera,
            detection,
            ready_timeout: METADATA_TIMEOUT,
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraController {
        &mut self.camera
    }

    pub fn detection(&self) -> &DetectionLoop {
        &self.detection
    }

    pub fn detection_mut(&mut self) -> &mut DetectionLoop {
        &mut self.detection
    }

    pub fn sink(&self) -> Arc<VideoSink> {
        self.camera.sink()
    }

    pub fn overlay(&self) -> SharedOverlay {
        self.detection.overlay()
    }

    pub fn is_camera_active(&self) -> bool {
        self.camera.is_active()
    }

    pub fn is_detecting(&self) -> bool {
        self.detection.is_running()
    }

    pub fn load_detector(&mut self, detector: Box<dyn FaceDetector>) {
        self.detection.set_detector(detector);
    }

    /// Swaps in a freshly loaded detector. Detection is left stopped unless
    /// `resume` is set and the camera is active, in which case it restarts
    /// on the new detector.
    pub fn replace_detector(
        &mut self,
        detector: Box<dyn FaceDetector>,
        resume: bool,
    ) -> Result<(), SessionError> {
        self.detection.stop();
        self.detection.set_detector(detector);
        if resume && self.camera.is_active() {
            self.detection.start(&self.camera)?;
        }
        Ok(())
    }

    /// Starts the camera and, once the video is ready, detection (if a
    /// detector is loaded). A camera that never becomes ready is stopped.
    pub fn start_camera(&mut self) -> Result<(), SessionError> {
        if self.camera.is_active() {
            return Ok(());
        }
        self.camera.start()?;
        if let Err(e) = self.camera.wait_until_ready(self.ready_timeout) {
            log::error!("Video not ready after {:?}", self.ready_timeout);
            self.camera.stop();
            return Err(e.into());
        }
        if self.detection.has_detector() {
            self.detection.start(&self.camera)?;
        } else {
            log::info!("No detector loaded; showing video only");
        }
        Ok(())
    }

    /// Stops detection, then the camera. Idempotent.
    pub fn stop_camera(&mut self) {
        self.detection.stop();
        self.camera.stop();
    }

    pub fn toggle_camera(&mut self) -> Result<(), SessionError> {
        if self.camera.is_active() {
            self.stop_camera();
            Ok(())
        } else {
            self.start_camera()
        }
    }

    pub fn start_detection(&mut self) -> Result<(), SessionError> {
        self.detection.start(&self.camera)?;
        Ok(())
    }

    pub fn stop_detection(&mut self) {
        self.detection.stop();
    }

    pub fn toggle_detection(&mut self) -> Result<(), SessionError> {
        if self.detection.is_running() {
            self.stop_detection();
            Ok(())
        } else {
            self.start_detection()
        }
    }
}

impl Drop for FaceCamSession {
    fn drop(&mut self) {
        self.stop_camera();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    use crate::pipeline::detection_loop::DetectionLoopConfig;
    use crate::shared::display_size::DisplaySize;
    use crate::testing::{wait_until, FakeCamera, FakeDetector, RecordingOverlay};

    const PATIENCE: Duration = Duration::from_secs(5);

    fn session(camera: &FakeCamera, overlay: &RecordingOverlay) -> FaceCamSession {
        let ctrl = CameraController::new(Box::new(camera.backend()), camera.request());
        let shared: SharedOverlay = Arc::new(Mutex::new(overlay.clone()));
        let detection = DetectionLoop::new(
            shared,
            DetectionLoopConfig {
                interval: Duration::from_millis(5),
                ..Default::default()
            },
        );
        FaceCamSession::new(ctrl, detection).with_ready_timeout(PATIENCE)
    }

    #[test]
    fn test_start_camera_starts_detection_when_loaded() {
        let camera = FakeCamera::granting(64, 48);
        let overlay = RecordingOverlay::new();
        let mut session = session(&camera, &overlay);
        session.load_detector(Box::new(FakeDetector::new()));

        session.start_camera().unwrap();
        assert!(session.is_camera_active());
        assert!(session.is_detecting());
        assert_eq!(overlay.with(|r| r.size), DisplaySize::new(64, 48));
        assert!(wait_until(PATIENCE, || overlay.draws() >= 3));
    }

    #[test]
    fn test_start_camera_without_detector_shows_video_only() {
        let camera = FakeCamera::granting(16, 16);
        let overlay = RecordingOverlay::new();
        let mut session = session(&camera, &overlay);

        session.start_camera().unwrap();
        assert!(session.is_camera_active());
        assert!(!session.is_detecting());
        assert!(matches!(
            session.start_detection(),
            Err(SessionError::Detection(DetectionLoopError::NoDetector))
        ));
    }

    #[test]
    fn test_denied_camera_creates_no_timer() {
        let camera = FakeCamera::denying();
        let overlay = RecordingOverlay::new();
        let mut session = session(&camera, &overlay);
        session.load_detector(Box::new(FakeDetector::new()));

        let err = session.start_camera().unwrap_err();
        assert!(matches!(err, SessionError::Camera(CameraError::AccessDenied(_))));
        assert!(!session.is_camera_active());
        assert!(!session.is_detecting());
        assert_eq!(overlay.clears(), 0);
    }

    #[test]
    fn test_stalled_camera_is_released() {
        let camera = FakeCamera::stalled(16, 16);
        let overlay = RecordingOverlay::new();
        let mut session =
            session(&camera, &overlay).with_ready_timeout(Duration::from_millis(20));

        let err = session.start_camera().unwrap_err();
        assert!(matches!(err, SessionError::Camera(CameraError::NotReady)));
        assert!(!session.is_camera_active());
        assert_eq!(camera.live_streams(), 0);
    }

    #[test]
    fn test_ready_timeout_holds_when_reads_block() {
        let camera = FakeCamera::blocking(16, 16, Duration::from_secs(2));
        let overlay = RecordingOverlay::new();
        let ctrl = CameraController::new(Box::new(camera.backend()), camera.request())
            .with_stop_timeout(Duration::from_millis(50));
        let shared: SharedOverlay = Arc::new(Mutex::new(overlay.clone()));
        let detection = DetectionLoop::new(shared, DetectionLoopConfig::default());
        let mut session =
            FaceCamSession::new(ctrl, detection).with_ready_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        let err = session.start_camera().unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(err, SessionError::Camera(CameraError::NotReady)));
        assert!(!session.is_camera_active());
        assert!(wait_until(PATIENCE, || camera.live_streams() == 0));
    }

    #[test]
    fn test_stop_camera_stops_everything() {
        let camera = FakeCamera::granting(32, 24);
        let overlay = RecordingOverlay::new();
        let mut session = session(&camera, &overlay);
        session.load_detector(Box::new(FakeDetector::new()));
        session.start_camera().unwrap();

        session.stop_camera();
        assert!(!session.is_camera_active());
        assert!(!session.is_detecting());
        assert_eq!(camera.live_streams(), 0);
        assert_eq!(camera.stopped_streams(), 1);
    }

    #[test]
    fn test_toggle_detection() {
        let camera = FakeCamera::granting(32, 24);
        let overlay = RecordingOverlay::new();
        let mut session = session(&camera, &overlay);
        session.load_detector(Box::new(FakeDetector::new()));
        session.start_camera().unwrap();

        session.toggle_detection().unwrap();
        assert!(!session.is_detecting());
        session.toggle_detection().unwrap();
        assert!(session.is_detecting());
    }

    #[test]
    fn test_replace_detector_resumes_on_new_detector() {
        let camera = FakeCamera::granting(32, 24);
        let overlay = RecordingOverlay::new();
        let mut session = session(&camera, &overlay);
        let old = FakeDetector::new();
        let new = FakeDetector::new();
        session.load_detector(Box::new(old.clone()));
        session.start_camera().unwrap();
        assert!(wait_until(PATIENCE, || old.calls() >= 1));

        session.replace_detector(Box::new(new.clone()), true).unwrap();
        assert!(session.is_detecting());
        let old_calls = old.calls();
        assert!(wait_until(PATIENCE, || new.calls() >= 3));
        assert_eq!(old.calls(), old_calls);
    }

    #[test]
    fn test_replace_detector_without_resume_stays_stopped() {
        let camera = FakeCamera::granting(32, 24);
        let overlay = RecordingOverlay::new();
        let mut session = session(&camera, &overlay);
        session.load_detector(Box::new(FakeDetector::new()));
        session.start_camera().unwrap();
        session.stop_detection();

        let new = FakeDetector::new();
        session.replace_detector(Box::new(new.clone()), false).unwrap();
        assert!(!session.is_detecting());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(new.calls(), 0);

        session.start_detection().unwrap();
        assert!(wait_until(PATIENCE, || new.calls() >= 1));
    }

    #[test]
    fn test_toggle_detection_without_camera_fails() {
        let camera = FakeCamera::granting(32, 24);
        let overlay = RecordingOverlay::new();
        let mut session = session(&camera, &overlay);
        session.load_detector(Box::new(FakeDetector::new()));

        assert!(matches!(
            session.toggle_detection(),
            Err(SessionError::Detection(DetectionLoopError::NotActive))
        ));
    }

    #[test]
    fn test_toggle_camera_round_trip() {
        let camera = FakeCamera::granting(32, 24);
        let overlay = RecordingOverlay::new();
        let mut session = session(&camera, &overlay);

        session.toggle_camera().unwrap();
        assert!(session.is_camera_active());
        session.toggle_camera().unwrap();
        assert!(!session.is_camera_active());
        assert_eq!(camera.live_streams(), 0);
    }

    #[test]
    fn test_unmount_while_running_cancels_timer() {
        let camera = FakeCamera::granting(32, 24);
        let overlay = RecordingOverlay::new();
        let detector = FakeDetector::new();
        {
            let mut session = session(&camera, &overlay);
            session.load_detector(Box::new(detector.clone()));
            session.start_camera().unwrap();
            assert!(wait_until(PATIENCE, || detector.calls() >= 2));
        }
        assert_eq!(camera.live_streams(), 0);
        let calls = detector.calls();
        let draws = overlay.draws();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(detector.calls(), calls);
        assert_eq!(overlay.draws(), draws);
    }
}
