use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};

use crate::camera::domain::camera_controller::CameraController;
use crate::camera::domain::video_sink::{ReadyState, VideoSink};
use crate::detection::domain::face_detection::resize_results;
use crate::detection::domain::face_detector::FaceDetector;
use crate::overlay::domain::draw_options::DrawLandmarksOptions;
use crate::overlay::domain::overlay_surface::OverlaySurface;
use crate::pipeline::loop_logger::{LoopLogger, NullLoopLogger};
use crate::shared::constants::DEFAULT_DETECTION_INTERVAL;

/// Overlay shared between the detection thread and whoever displays it.
pub type SharedOverlay = Arc<Mutex<dyn OverlaySurface>>;

#[derive(Debug, thiserror::Error)]
pub enum DetectionLoopError {
    #[error("camera is not active")]
    NotActive,
    #[error("video is not ready for detection")]
    VideoNotReady,
    #[error("no face detector loaded")]
    NoDetector,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionLoopConfig {
    /// Period between ticks.
    pub interval: Duration,
    pub draw: DrawLandmarksOptions,
}

impl Default for DetectionLoopConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DETECTION_INTERVAL,
            draw: DrawLandmarksOptions::default(),
        }
    }
}

#[derive(Default)]
struct TickCounters {
    completed: AtomicU64,
    skipped: AtomicU64,
}

/// The running timer: a single thread, its stop channel and cancel flag.
struct Worker {
    stop_tx: Sender<()>,
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<(Box<dyn FaceDetector>, Box<dyn LoopLogger>)>,
}

/// Periodically detects faces in the sink's current frame and draws their
/// landmarks on the overlay.
///
/// Ticks run one after another on a single timer thread. A tick that falls
/// due while detection is still in flight is dropped rather than queued.
pub struct DetectionLoop {
    config: DetectionLoopConfig,
    overlay: SharedOverlay,
    detector: Option<Box<dyn FaceDetector>>,
    logger: Option<Box<dyn LoopLogger>>,
    counters: Arc<TickCounters>,
    worker: Option<Worker>,
}

impl DetectionLoop {
    pub fn new(overlay: SharedOverlay, config: DetectionLoopConfig) -> Self {
        Self {
            config,
            overlay,
            detector: None,
            logger: Some(Box::new(NullLoopLogger)),
            counters: Arc::default(),
            worker: None,
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn LoopLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Installs the detector used by the next `start`. While running, the
    /// current detector keeps ticking and is discarded on `stop`.
    pub fn set_detector(&mut self, detector: Box<dyn FaceDetector>) {
        if self.is_running() {
            log::info!("Detector replaced while running; applies after restart");
        }
        self.detector = Some(detector);
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some() || self.is_running()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn config(&self) -> &DetectionLoopConfig {
        &self.config
    }

    /// Takes effect on the next `start`.
    pub fn set_config(&mut self, config: DetectionLoopConfig) {
        self.config = config;
    }

    pub fn overlay(&self) -> SharedOverlay {
        self.overlay.clone()
    }

    pub fn ticks_completed(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.counters.skipped.load(Ordering::SeqCst)
    }

    /// Sizes the overlay to the video and starts ticking.
    ///
    /// Requires an active camera whose sink has a frame. Starting while
    /// already running is a no-op.
    pub fn start(&mut self, camera: &CameraController) -> Result<(), DetectionLoopError> {
        if self.is_running() {
            log::debug!("Detection already running");
            return Ok(());
        }
        if !camera.is_active() {
            return Err(DetectionLoopError::NotActive);
        }
        let sink = camera.sink();
        if sink.ready_state() < ReadyState::HaveEnoughData {
            return Err(DetectionLoopError::VideoNotReady);
        }
        let size = sink.video_size().ok_or(DetectionLoopError::VideoNotReady)?;
        let detector = self.detector.take().ok_or(DetectionLoopError::NoDetector)?;
        let logger = self
            .logger
            .take()
            .unwrap_or_else(|| Box::new(NullLoopLogger));

        self.overlay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .match_dimensions(size);

        self.counters.completed.store(0, Ordering::SeqCst);
        self.counters.skipped.store(0, Ordering::SeqCst);

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let tick = TickContext {
            sink,
            overlay: self.overlay.clone(),
            options: self.config.draw.clone(),
            cancelled: cancelled.clone(),
        };
        let handle = spawn_timer(
            detector,
            logger,
            tick,
            self.config.interval,
            stop_rx,
            self.counters.clone(),
        );
        self.worker = Some(Worker {
            stop_tx,
            cancelled,
            handle,
        });
        log::info!(
            "Detection started: overlay {size}, every {} ms",
            self.config.interval.as_millis()
        );
        Ok(())
    }

    /// Cancels the timer and waits for the thread to exit, recovering the
    /// detector for the next run. No-op when not running.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.cancelled.store(true, Ordering::SeqCst);
        let _ = worker.stop_tx.send(());
        match worker.handle.join() {
            Ok((detector, logger)) => {
                logger.summary();
                if self.detector.is_none() {
                    self.detector = Some(detector);
                } else {
                    log::debug!("Dropping the replaced detector");
                }
                self.logger = Some(logger);
            }
            Err(_) => log::error!("Detection thread panicked; detector dropped"),
        }
        log::info!(
            "Detection stopped after {} ticks ({} skipped)",
            self.ticks_completed(),
            self.ticks_skipped()
        );
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

struct TickContext {
    sink: Arc<VideoSink>,
    overlay: SharedOverlay,
    options: DrawLandmarksOptions,
    cancelled: Arc<AtomicBool>,
}

#[derive(Debug, PartialEq)]
enum TickOutcome {
    Drawn { faces: usize },
    NoFrame,
    Cancelled,
}

fn spawn_timer(
    mut detector: Box<dyn FaceDetector>,
    mut logger: Box<dyn LoopLogger>,
    tick: TickContext,
    interval: Duration,
    stop_rx: Receiver<()>,
    counters: Arc<TickCounters>,
) -> JoinHandle<(Box<dyn FaceDetector>, Box<dyn LoopLogger>)> {
    thread::spawn(move || {
        let ticker = crossbeam_channel::tick(interval);
        loop {
            let due = select! {
                recv(stop_rx) -> _ => false,
                recv(ticker) -> _ => true,
            };
            if !due || tick.cancelled.load(Ordering::SeqCst) {
                break;
            }

            let started = Instant::now();
            match run_tick(detector.as_mut(), &tick, logger.as_mut()) {
                Ok(TickOutcome::Drawn { faces }) => {
                    let completed = counters.completed.fetch_add(1, Ordering::SeqCst) + 1;
                    logger.metric("faces", faces as f64);
                    logger.timing("tick", elapsed_ms(started));
                    logger.tick(completed);
                    log::debug!("Tick {completed}: {faces} face(s)");
                }
                Ok(TickOutcome::NoFrame) => {
                    counters.skipped.fetch_add(1, Ordering::SeqCst);
                    log::debug!("No frame available, tick skipped");
                }
                Ok(TickOutcome::Cancelled) => break,
                Err(e) => {
                    counters.skipped.fetch_add(1, Ordering::SeqCst);
                    log::warn!("Detection tick failed, skipping: {e}");
                }
            }
        }
        (detector, logger)
    })
}

/// detect → resize → clear → draw. The overlay is only touched once
/// detection has succeeded, and never after cancellation.
fn run_tick(
    detector: &mut dyn FaceDetector,
    tick: &TickContext,
    logger: &mut dyn LoopLogger,
) -> Result<TickOutcome, Box<dyn std::error::Error>> {
    let Some(frame) = tick.sink.current_frame() else {
        return Ok(TickOutcome::NoFrame);
    };

    let t0 = Instant::now();
    let detections = detector.detect(&frame)?;
    logger.timing("detect", elapsed_ms(t0));

    let display = tick.sink.video_size().unwrap_or_else(|| frame.size());
    let detections = resize_results(detections, frame.size(), display);

    let t1 = Instant::now();
    let mut overlay = tick.overlay.lock().unwrap_or_else(PoisonError::into_inner);
    if tick.cancelled.load(Ordering::SeqCst) {
        return Ok(TickOutcome::Cancelled);
    }
    if overlay.size() != display {
        log::debug!("Video resized to {display}, matching overlay");
        overlay.match_dimensions(display);
    }
    overlay.clear();
    for landmarks in detections.iter().filter_map(|d| d.landmarks.as_ref()) {
        overlay.draw_face_landmarks(landmarks, &tick.options);
    }
    logger.timing("draw", elapsed_ms(t1));

    Ok(TickOutcome::Drawn {
        faces: detections.len(),
    })
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
