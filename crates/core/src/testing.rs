//! In-memory stand-ins for the camera, detector and overlay used by the
//! lifecycle tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::camera::domain::camera_backend::{
    CameraBackend, CaptureRequest, CaptureSource, StreamMetadata, VideoStream,
};
use crate::camera::domain::camera_error::CameraError;
use crate::detection::domain::face_detection::{BoundingBox, FaceDetection};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_landmarks::{FaceLandmarks, LandmarkLayout};
use crate::overlay::domain::draw_options::DrawLandmarksOptions;
use crate::overlay::domain::overlay_surface::OverlaySurface;
use crate::shared::display_size::DisplaySize;
use crate::shared::frame::Frame;

const FAKE_FRAME_INTERVAL: Duration = Duration::from_millis(2);

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[derive(Default)]
struct CameraCounters {
    acquisitions: AtomicUsize,
    live: AtomicUsize,
    stopped: AtomicUsize,
    width: AtomicU32,
    height: AtomicU32,
}

/// Fake device. Clones of its backend share the same counters.
pub struct FakeCamera {
    grant: bool,
    stalled: bool,
    read_delay: Duration,
    counters: Arc<CameraCounters>,
}

impl FakeCamera {
    pub fn granting(width: u32, height: u32) -> Self {
        let counters = CameraCounters::default();
        counters.width.store(width, Ordering::SeqCst);
        counters.height.store(height, Ordering::SeqCst);
        Self {
            grant: true,
            stalled: false,
            read_delay: FAKE_FRAME_INTERVAL,
            counters: Arc::new(counters),
        }
    }

    /// Grants access but the stream ends before delivering a frame.
    pub fn stalled(width: u32, height: u32) -> Self {
        Self {
            stalled: true,
            ..Self::granting(width, height)
        }
    }

    /// Grants access but every read blocks for `delay`, like a device
    /// that opened and never sends a frame.
    pub fn blocking(width: u32, height: u32, delay: Duration) -> Self {
        Self {
            read_delay: delay,
            ..Self::granting(width, height)
        }
    }

    pub fn denying() -> Self {
        Self {
            grant: false,
            stalled: false,
            read_delay: FAKE_FRAME_INTERVAL,
            counters: Arc::default(),
        }
    }

    pub fn backend(&self) -> FakeBackend {
        FakeBackend {
            grant: self.grant,
            stalled: self.stalled,
            read_delay: self.read_delay,
            counters: self.counters.clone(),
        }
    }

    pub fn request(&self) -> CaptureRequest {
        CaptureRequest::new(CaptureSource::File(PathBuf::from("fake.mp4")))
    }

    /// Changes the size of frames produced from now on.
    pub fn resize(&self, width: u32, height: u32) {
        self.counters.width.store(width, Ordering::SeqCst);
        self.counters.height.store(height, Ordering::SeqCst);
    }

    pub fn acquisitions(&self) -> usize {
        self.counters.acquisitions.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn stopped_streams(&self) -> usize {
        self.counters.stopped.load(Ordering::SeqCst)
    }
}

pub struct FakeBackend {
    grant: bool,
    stalled: bool,
    read_delay: Duration,
    counters: Arc<CameraCounters>,
}

impl CameraBackend for FakeBackend {
    fn acquire(&mut self, request: &CaptureRequest) -> Result<Box<dyn VideoStream>, CameraError> {
        if !self.grant {
            return Err(CameraError::AccessDenied(request.source.to_string()));
        }
        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        let metadata = StreamMetadata {
            width: self.counters.width.load(Ordering::SeqCst),
            height: self.counters.height.load(Ordering::SeqCst),
            fps: 500.0,
            codec: "rawvideo".into(),
            description: "fake camera".into(),
        };
        Ok(Box::new(FakeStream {
            metadata,
            counters: self.counters.clone(),
            live: true,
            stalled: self.stalled,
            read_delay: self.read_delay,
            sequence: 0,
        }))
    }
}

struct FakeStream {
    metadata: StreamMetadata,
    counters: Arc<CameraCounters>,
    live: bool,
    stalled: bool,
    read_delay: Duration,
    sequence: u64,
}

impl VideoStream for FakeStream {
    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if !self.live || self.stalled {
            return Ok(None);
        }
        thread::sleep(self.read_delay);
        let width = self.counters.width.load(Ordering::SeqCst);
        let height = self.counters.height.load(Ordering::SeqCst);
        let frame = Frame::filled(width, height, [90, 90, 90], self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Detector reporting one face in the centre of every frame, with five
/// keypoints inside the frame.
#[derive(Clone, Default)]
pub struct FakeDetector {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Duration,
}

impl FakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceDetector for FakeDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err("inference failed".into());
        }
        let (w, h) = (frame.width() as f64, frame.height() as f64);
        let points = [
            (w * 0.35, h * 0.4),
            (w * 0.65, h * 0.4),
            (w * 0.5, h * 0.55),
            (w * 0.4, h * 0.7),
            (w * 0.6, h * 0.7),
        ];
        let landmarks = FaceLandmarks::from_points(LandmarkLayout::FivePoint, &points)?;
        let bbox = BoundingBox::from_corners(w * 0.25, h * 0.25, w * 0.75, h * 0.85);
        Ok(vec![FaceDetection::new(bbox, 0.9).with_landmarks(landmarks)])
    }
}

#[derive(Default)]
pub struct OverlayRecord {
    pub size: DisplaySize,
    pub clears: usize,
    pub draws: usize,
    pub resizes: usize,
    pub out_of_bounds: usize,
}

/// Overlay that only records what was asked of it.
#[derive(Clone, Default)]
pub struct RecordingOverlay {
    record: Arc<Mutex<OverlayRecord>>,
}

impl RecordingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&OverlayRecord) -> R) -> R {
        f(&self.record.lock().unwrap())
    }

    pub fn clears(&self) -> usize {
        self.with(|r| r.clears)
    }

    pub fn draws(&self) -> usize {
        self.with(|r| r.draws)
    }
}

impl OverlaySurface for RecordingOverlay {
    fn size(&self) -> DisplaySize {
        self.with(|r| r.size)
    }

    fn match_dimensions(&mut self, size: DisplaySize) {
        let mut record = self.record.lock().unwrap();
        record.size = size;
        record.resizes += 1;
    }

    fn clear(&mut self) {
        self.record.lock().unwrap().clears += 1;
    }

    fn draw_face_landmarks(&mut self, landmarks: &FaceLandmarks, _options: &DrawLandmarksOptions) {
        let mut record = self.record.lock().unwrap();
        record.draws += 1;
        let size = record.size;
        record.out_of_bounds += landmarks.visible().filter(|&(x, y)| !size.contains(x, y)).count();
    }
}
