use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::camera::domain::camera_backend::{
    CameraBackend, CaptureRequest, StreamMetadata, VideoStream,
};
use crate::camera::domain::camera_error::CameraError;
use crate::camera::domain::video_sink::{ReadyState, VideoSink};
use crate::shared::constants::PLAYBACK_STOP_TIMEOUT;

/// An acquired camera. The stream is owned by the playback thread, which
/// stops it on exit and then signals `exited`.
struct CameraSession {
    metadata: StreamMetadata,
    cancelled: Arc<AtomicBool>,
    exited: Receiver<()>,
    playback: JoinHandle<()>,
}

/// Acquires and releases the camera and pumps its frames into a [`VideoSink`].
///
/// `start` and `stop` are the only mutators of the active state.
pub struct CameraController {
    backend: Box<dyn CameraBackend>,
    request: CaptureRequest,
    sink: Arc<VideoSink>,
    session: Option<CameraSession>,
    stop_timeout: Duration,
}

impl CameraController {
    pub fn new(backend: Box<dyn CameraBackend>, request: CaptureRequest) -> Self {
        Self {
            backend,
            request,
            sink: VideoSink::new(),
            session: None,
            stop_timeout: PLAYBACK_STOP_TIMEOUT,
        }
    }

    /// Bounds how long `stop` waits for a read in progress to return.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn sink(&self) -> Arc<VideoSink> {
        self.sink.clone()
    }

    /// Replaces the capture request used by the next `start`.
    pub fn set_request(&mut self, request: CaptureRequest) {
        self.request = request;
    }

    pub fn metadata(&self) -> Option<&StreamMetadata> {
        self.session.as_ref().map(|s| &s.metadata)
    }

    /// Requests camera access, binds the stream to the sink and starts
    /// playback. On failure the controller stays inactive.
    pub fn start(&mut self) -> Result<(), CameraError> {
        if self.is_active() {
            log::debug!("Camera already active");
            return Ok(());
        }

        log::info!("Requesting camera access for {}", self.request.source);
        let stream = match self.backend.acquire(&self.request) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Camera access failed: {e}");
                return Err(e);
            }
        };

        let metadata = stream.metadata().clone();
        log::info!(
            "Camera granted: {} {}x{} @ {:.1} fps ({})",
            metadata.description,
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.codec
        );
        self.sink.attach(metadata.clone());

        let cancelled = Arc::new(AtomicBool::new(false));
        let (exited_tx, exited) = crossbeam_channel::bounded(1);
        let playback = thread::spawn({
            let sink = self.sink.clone();
            let cancelled = cancelled.clone();
            move || {
                run_playback(stream, &sink, &cancelled);
                let _ = exited_tx.send(());
            }
        });
        self.session = Some(CameraSession {
            metadata,
            cancelled,
            exited,
            playback,
        });
        Ok(())
    }

    /// Waits until the sink holds a decodable frame.
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<(), CameraError> {
        if !self.is_active() {
            return Err(CameraError::NotReady);
        }
        if self.sink.wait_for(ReadyState::HaveEnoughData, timeout) {
            Ok(())
        } else {
            Err(CameraError::NotReady)
        }
    }

    /// Stops playback and every stream track, then releases the stream.
    /// No-op when inactive.
    ///
    /// A read that does not return within the stop timeout is abandoned:
    /// the playback thread is detached and releases the stream itself once
    /// the read comes back. The controller is inactive either way.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.cancelled.store(true, Ordering::SeqCst);
        match session.exited.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if session.playback.join().is_err() {
                    log::error!("Camera playback thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Camera read still blocked after {:?}; detaching playback thread",
                    self.stop_timeout
                );
            }
        }
        self.sink.detach();
        log::info!("Camera stopped");
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_playback(mut stream: Box<dyn VideoStream>, sink: &VideoSink, cancelled: &AtomicBool) {
    while !cancelled.load(Ordering::SeqCst) {
        match stream.read_frame() {
            // A read that outlived `stop` must not repopulate the sink.
            Ok(Some(_)) if cancelled.load(Ordering::SeqCst) => break,
            Ok(Some(frame)) => sink.present(frame),
            Ok(None) => {
                log::info!("Camera stream ended");
                break;
            }
            Err(e) => {
                log::error!("Camera read failed: {e}");
                break;
            }
        }
    }
    stream.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::testing::{wait_until, FakeCamera};

    fn controller(camera: &FakeCamera) -> CameraController {
        CameraController::new(Box::new(camera.backend()), camera.request())
    }

    #[test]
    fn test_start_then_stop_releases_stream() {
        let camera = FakeCamera::granting(64, 48);
        let mut ctrl = controller(&camera);

        ctrl.start().unwrap();
        assert!(ctrl.is_active());
        assert_eq!(camera.live_streams(), 1);
        ctrl.wait_until_ready(Duration::from_secs(5)).unwrap();

        ctrl.stop();
        assert!(!ctrl.is_active());
        assert_eq!(camera.live_streams(), 0);
        assert_eq!(camera.stopped_streams(), 1);
        assert_eq!(ctrl.sink().ready_state(), ReadyState::HaveNothing);
    }

    #[test]
    fn test_denied_access_stays_inactive() {
        let camera = FakeCamera::denying();
        let mut ctrl = controller(&camera);

        let err = ctrl.start().unwrap_err();
        assert!(matches!(err, CameraError::AccessDenied(_)));
        assert!(!ctrl.is_active());
        assert_eq!(camera.live_streams(), 0);
        assert!(ctrl.wait_until_ready(Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_stop_when_inactive_is_noop() {
        let camera = FakeCamera::granting(8, 8);
        let mut ctrl = controller(&camera);
        ctrl.stop();
        ctrl.stop();
        assert_eq!(camera.stopped_streams(), 0);
    }

    #[test]
    fn test_start_twice_acquires_once() {
        let camera = FakeCamera::granting(8, 8);
        let mut ctrl = controller(&camera);
        ctrl.start().unwrap();
        ctrl.start().unwrap();
        assert_eq!(camera.acquisitions(), 1);
    }

    #[test]
    fn test_restart_after_stop() {
        let camera = FakeCamera::granting(8, 8);
        let mut ctrl = controller(&camera);
        ctrl.start().unwrap();
        ctrl.stop();
        ctrl.start().unwrap();
        assert!(ctrl.is_active());
        assert_eq!(camera.acquisitions(), 2);
        assert_eq!(camera.live_streams(), 1);
    }

    #[test]
    fn test_drop_releases_stream() {
        let camera = FakeCamera::granting(8, 8);
        {
            let mut ctrl = controller(&camera);
            ctrl.start().unwrap();
        }
        assert_eq!(camera.live_streams(), 0);
    }

    #[test]
    fn test_metadata_available_while_active() {
        let camera = FakeCamera::granting(320, 240);
        let mut ctrl = controller(&camera);
        assert!(ctrl.metadata().is_none());
        ctrl.start().unwrap();
        assert_eq!(ctrl.metadata().map(|m| (m.width, m.height)), Some((320, 240)));
    }

    #[test]
    fn test_stop_does_not_wait_for_blocked_read() {
        let camera = FakeCamera::blocking(16, 16, Duration::from_secs(2));
        let mut ctrl = controller(&camera).with_stop_timeout(Duration::from_millis(50));
        ctrl.start().unwrap();

        let started = Instant::now();
        ctrl.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!ctrl.is_active());
        assert_eq!(ctrl.sink().ready_state(), ReadyState::HaveNothing);

        // The abandoned read returns later; its frame is discarded and the
        // stream still gets released.
        assert!(wait_until(Duration::from_secs(5), || camera.live_streams() == 0));
        assert_eq!(camera.stopped_streams(), 1);
        assert_eq!(ctrl.sink().ready_state(), ReadyState::HaveNothing);
    }
}
