use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::Receiver;
use iced::widget::{
    button, checkbox, column, container, image, pick_list, row, slider, stack, text,
    text_input, Space,
};
use iced::{ContentFit, Element, Length, Subscription, Task, Theme};

use landmark_cam_core::camera::domain::camera_backend::{CaptureRequest, CaptureSource};
use landmark_cam_core::camera::domain::camera_controller::CameraController;
use landmark_cam_core::camera::infrastructure::ffmpeg_camera::FfmpegCamera;
use landmark_cam_core::detection::infrastructure::detector_factory::DetectorOptions;
use landmark_cam_core::overlay::infrastructure::rgba_overlay::RgbaOverlay;
use landmark_cam_core::pipeline::detection_loop::{
    DetectionLoop, DetectionLoopConfig, SharedOverlay,
};
use landmark_cam_core::pipeline::face_cam_session::FaceCamSession;
use landmark_cam_core::shared::display_size::DisplaySize;

use crate::settings::{Appearance, Detector, Settings};
use crate::workers::detector_loader::{self, LoaderMessage};

/// Roughly display rate; frames arriving faster are skipped.
const REFRESH_INTERVAL: Duration = Duration::from_millis(33);

/// Stopping the camera runs on the UI thread.
const CAMERA_STOP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum Message {
    ToggleCamera,
    ToggleDetection,
    Refresh,
    DeviceChanged(String),
    DetectorChanged(Detector),
    Landmarks68Toggled(bool),
    ConfidenceChanged(u32),
    ConfidenceReleased,
    IntervalChanged(u32),
    AppearanceChanged(Appearance),
}

struct PendingLoad {
    rx: Receiver<LoaderMessage>,
    cancelled: Arc<AtomicBool>,
    progress: Option<(u64, u64)>,
}

pub struct App {
    pub settings: Settings,
    session: FaceCamSession,
    overlay: Arc<Mutex<RgbaOverlay>>,
    video: Option<image::Handle>,
    landmarks: Option<image::Handle>,
    last_sequence: Option<u64>,
    last_ticks: u64,
    loading: Option<PendingLoad>,
    detector_ready: bool,
    /// Whether the user wants detection on; reloads and camera starts honour it.
    detection_wanted: bool,
    error: Option<String>,
}

impl App {
    pub fn new() -> (Self, Task<Message>) {
        let settings = Settings::load();
        let overlay = Arc::new(Mutex::new(RgbaOverlay::new(DisplaySize::default())));
        let shared: SharedOverlay = overlay.clone();
        let camera = CameraController::new(Box::new(FfmpegCamera::new()), capture_request(&settings))
            .with_stop_timeout(CAMERA_STOP_TIMEOUT);
        let detection = DetectionLoop::new(shared, loop_config(&settings));

        let mut app = Self {
            settings,
            session: FaceCamSession::new(camera, detection),
            overlay,
            video: None,
            landmarks: None,
            last_sequence: None,
            last_ticks: 0,
            loading: None,
            detector_ready: false,
            detection_wanted: true,
            error: None,
        };
        app.reload_detector();
        (app, Task::none())
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ToggleCamera => {
                self.error = None;
                if let Err(e) = self.session.toggle_camera() {
                    self.error = Some(format!("Camera: {e}"));
                }
                if !self.detection_wanted {
                    self.session.stop_detection();
                }
                if !self.session.is_camera_active() {
                    self.video = None;
                    self.landmarks = None;
                    self.last_sequence = None;
                }
            }
            Message::ToggleDetection => {
                self.error = None;
                if let Err(e) = self.session.toggle_detection() {
                    self.error = Some(format!("Detection: {e}"));
                }
                self.detection_wanted = self.session.is_detecting();
                if !self.session.is_detecting() {
                    self.landmarks = None;
                }
            }
            Message::Refresh => {
                self.poll_loader();
                self.refresh_images();
            }
            Message::DeviceChanged(device) => {
                self.settings.device = device;
                self.settings.save();
                self.session
                    .camera_mut()
                    .set_request(capture_request(&self.settings));
            }
            Message::DetectorChanged(detector) => {
                self.settings.detector = detector;
                self.settings.save();
                self.reload_detector();
            }
            Message::Landmarks68Toggled(enabled) => {
                self.settings.landmarks68 = enabled;
                self.settings.save();
                self.reload_detector();
            }
            Message::ConfidenceChanged(val) => {
                self.settings.confidence = val;
            }
            Message::ConfidenceReleased => {
                self.settings.save();
                self.reload_detector();
            }
            Message::IntervalChanged(val) => {
                self.settings.interval_ms = val;
                self.settings.save();
                self.apply_interval();
            }
            Message::AppearanceChanged(appearance) => {
                self.settings.appearance = appearance;
                self.settings.save();
            }
        }
        Task::none()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let camera_label = if self.session.is_camera_active() {
            "Stop camera"
        } else {
            "Start camera"
        };
        let detect_label = if self.session.is_detecting() {
            "Stop detection"
        } else {
            "Start detection"
        };
        let can_detect = self.session.is_camera_active() && self.detector_ready;

        let controls = row![
            button(text(camera_label).size(13))
                .on_press(Message::ToggleCamera)
                .style(button::primary)
                .padding([6, 14]),
            button(text(detect_label).size(13))
                .on_press_maybe(can_detect.then_some(Message::ToggleDetection))
                .style(button::secondary)
                .padding([6, 14]),
            Space::new().width(Length::Fill),
            pick_list(Appearance::ALL, Some(self.settings.appearance), Message::AppearanceChanged)
                .text_size(13),
        ]
        .spacing(8)
        .align_y(iced::Alignment::Center);

        let detector_row = row![
            text("Device").size(13),
            text_input("/dev/video0", &self.settings.device)
                .on_input_maybe(
                    (!self.session.is_camera_active()).then_some(Message::DeviceChanged)
                )
                .size(13)
                .width(160),
            text("Detector").size(13),
            pick_list(Detector::ALL, Some(self.settings.detector), Message::DetectorChanged)
                .text_size(13),
            checkbox(self.settings.landmarks68)
                .label("68-point landmarks")
                .on_toggle(Message::Landmarks68Toggled)
                .text_size(13),
        ]
        .spacing(12)
        .align_y(iced::Alignment::Center);

        let tuning_row = row![
            text("Confidence").size(13),
            slider(1..=100, self.settings.confidence, Message::ConfidenceChanged)
                .on_release(Message::ConfidenceReleased)
                .width(140),
            text(format!("{}%", self.settings.confidence)).size(13),
            text("Interval").size(13),
            slider(20..=1000, self.settings.interval_ms, Message::IntervalChanged)
                .step(10u32)
                .width(140),
            text(format!("{} ms", self.settings.interval_ms)).size(13),
        ]
        .spacing(12)
        .align_y(iced::Alignment::Center);

        let display: Element<'_, Message> = match &self.video {
            Some(frame) => {
                let mut layers = stack![image(frame.clone())
                    .content_fit(ContentFit::Contain)
                    .width(Length::Fill)
                    .height(Length::Fill)];
                if let Some(landmarks) = &self.landmarks {
                    layers = layers.push(
                        image(landmarks.clone())
                            .content_fit(ContentFit::Contain)
                            .width(Length::Fill)
                            .height(Length::Fill),
                    );
                }
                layers.into()
            }
            None => container(text("Camera off").size(14))
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .into(),
        };

        column![
            controls,
            detector_row,
            tuning_row,
            text(self.status()).size(12),
            container(display).width(Length::Fill).height(Length::Fill),
        ]
        .spacing(10)
        .padding(16)
        .height(Length::Fill)
        .into()
    }

    pub fn theme(&self) -> Theme {
        match self.settings.appearance {
            Appearance::Dark => Theme::Dark,
            Appearance::Light => Theme::Light,
        }
    }

    pub fn subscription(&self) -> Subscription<Message> {
        if self.session.is_camera_active() || self.loading.is_some() {
            iced::time::every(REFRESH_INTERVAL).map(|_| Message::Refresh)
        } else {
            Subscription::none()
        }
    }

    fn status(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        if let Some(load) = &self.loading {
            return match load.progress {
                Some((done, total)) if total > 0 => {
                    format!("Downloading model... {}%", done * 100 / total)
                }
                _ => "Loading face detector...".to_string(),
            };
        }
        let camera = match self.session.camera().metadata() {
            Some(m) => format!("{} {}x{} @ {:.0} fps", m.description, m.width, m.height, m.fps),
            None => "Camera off".to_string(),
        };
        if self.session.is_detecting() {
            let detection = self.session.detection();
            format!(
                "{camera} | detecting: {} ticks, {} skipped",
                detection.ticks_completed(),
                detection.ticks_skipped()
            )
        } else {
            camera
        }
    }

    /// Cancels any pending load and starts loading the configured detector.
    fn reload_detector(&mut self) {
        if let Some(previous) = self.loading.take() {
            previous.cancelled.store(true, Ordering::Relaxed);
        }
        self.session.stop_detection();
        self.landmarks = None;
        self.detector_ready = false;

        let options = DetectorOptions {
            kind: self.settings.detector.into(),
            confidence: Some(self.settings.confidence_fraction()),
            landmarks68: self.settings.landmarks68,
            ..Default::default()
        };
        let (rx, cancelled) = detector_loader::spawn(options);
        self.loading = Some(PendingLoad {
            rx,
            cancelled,
            progress: None,
        });
    }

    fn poll_loader(&mut self) {
        let Some(load) = self.loading.as_mut() else {
            return;
        };
        let mut finished = None;
        while let Ok(message) = load.rx.try_recv() {
            match message {
                LoaderMessage::DownloadProgress(done, total) => load.progress = Some((done, total)),
                other => finished = Some(other),
            }
        }
        match finished {
            Some(LoaderMessage::Loaded(detector)) => {
                self.loading = None;
                self.detector_ready = true;
                if let Err(e) = self.session.replace_detector(detector, self.detection_wanted) {
                    self.error = Some(format!("Detection: {e}"));
                }
            }
            Some(LoaderMessage::Error(e)) => {
                self.loading = None;
                log::error!("Failed to load detector: {e}");
                self.error = Some(format!("Model: {e}"));
            }
            _ => {}
        }
    }

    fn apply_interval(&mut self) {
        let was_running = self.session.is_detecting();
        self.session.stop_detection();
        let config = DetectionLoopConfig {
            interval: interval(&self.settings),
            ..self.session.detection().config().clone()
        };
        self.session.detection_mut().set_config(config);
        if was_running {
            if let Err(e) = self.session.start_detection() {
                self.error = Some(format!("Detection: {e}"));
            }
        }
    }

    fn refresh_images(&mut self) {
        let sink = self.session.sink();
        if let Some(frame) = sink.current_frame() {
            if self.last_sequence != Some(frame.sequence()) {
                self.last_sequence = Some(frame.sequence());
                self.video = Some(image::Handle::from_rgba(
                    frame.width(),
                    frame.height(),
                    frame.to_rgba(),
                ));
            }
        }

        if !self.session.is_detecting() {
            self.landmarks = None;
            return;
        }
        let ticks = self.session.detection().ticks_completed();
        if ticks == self.last_ticks && self.landmarks.is_some() {
            return;
        }
        self.last_ticks = ticks;
        let overlay = self.overlay.lock().unwrap_or_else(PoisonError::into_inner);
        let (width, height) = overlay.image().dimensions();
        if width > 0 && height > 0 {
            self.landmarks = Some(image::Handle::from_rgba(
                width,
                height,
                overlay.pixels().to_vec(),
            ));
        }
    }
}

fn capture_request(settings: &Settings) -> CaptureRequest {
    CaptureRequest::new(CaptureSource::Device {
        format: settings.input_format.clone(),
        name: settings.device.clone(),
    })
}

fn interval(settings: &Settings) -> Duration {
    Duration::from_millis(settings.interval_ms.max(1) as u64)
}

fn loop_config(settings: &Settings) -> DetectionLoopConfig {
    DetectionLoopConfig {
        interval: interval(settings),
        ..Default::default()
    }
}
