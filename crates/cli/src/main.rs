use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use landmark_cam_core::camera::domain::camera_backend::{CaptureRequest, CaptureSource};
use landmark_cam_core::camera::domain::camera_controller::CameraController;
use landmark_cam_core::camera::domain::video_sink::VideoSink;
use landmark_cam_core::camera::infrastructure::ffmpeg_camera::{self, FfmpegCamera};
use landmark_cam_core::detection::infrastructure::detector_factory::{
    build_detector, DetectorKind, DetectorOptions,
};
use landmark_cam_core::overlay::infrastructure::rgba_overlay::RgbaOverlay;
use landmark_cam_core::overlay::infrastructure::snapshot_writer::SnapshotWriter;
use landmark_cam_core::pipeline::detection_loop::{
    DetectionLoop, DetectionLoopConfig, SharedOverlay,
};
use landmark_cam_core::pipeline::face_cam_session::FaceCamSession;
use landmark_cam_core::pipeline::loop_logger::StdoutLoopLogger;
use landmark_cam_core::shared::constants::BUNDLED_MODELS_DIR;
use landmark_cam_core::shared::display_size::DisplaySize;

const SNAPSHOT_PERIOD: Duration = Duration::from_secs(1);

/// Live face-landmark overlay on a camera feed, run headless.
#[derive(Parser)]
#[command(name = "landmark-cam")]
struct Cli {
    /// Capture device (e.g. /dev/video0, "0" on macOS, "video=Name" on Windows).
    #[arg(long)]
    device: Option<String>,

    /// ffmpeg input format for the device (v4l2, avfoundation, dshow).
    #[arg(long)]
    input_format: Option<String>,

    /// Play a video file in a loop instead of opening a camera.
    #[arg(long, conflicts_with = "device")]
    file: Option<PathBuf>,

    /// Face detector: yolo or blazeface.
    #[arg(long, default_value = "yolo")]
    detector: String,

    /// Refine faces with the 68-point landmark model.
    #[arg(long)]
    landmarks68: bool,

    /// Face detection confidence threshold (0.0-1.0). Defaults per detector.
    #[arg(long)]
    confidence: Option<f64>,

    /// Milliseconds between detection ticks.
    #[arg(long, default_value = "100")]
    interval_ms: u64,

    /// Seconds to run before stopping (0 = until killed).
    #[arg(long, default_value = "10")]
    duration_secs: u64,

    /// Write a composited snapshot here every second.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Directory searched for bundled models.
    #[arg(long, default_value = BUNDLED_MODELS_DIR)]
    models_dir: PathBuf,

    /// List capture devices and exit.
    #[arg(long)]
    list_devices: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.list_devices {
        print_devices();
        return Ok(());
    }
    validate(&cli)?;

    let options = DetectorOptions {
        kind: cli.detector.parse()?,
        confidence: cli.confidence,
        landmarks68: cli.landmarks68,
        bundled_dir: cli.models_dir.clone(),
    };
    let detector = build_detector(&options, Some(Box::new(download_progress)))?;

    let overlay = Arc::new(Mutex::new(RgbaOverlay::new(DisplaySize::default())));
    let shared: SharedOverlay = overlay.clone();
    let config = DetectionLoopConfig {
        interval: Duration::from_millis(cli.interval_ms),
        ..Default::default()
    };
    let detection =
        DetectionLoop::new(shared, config).with_logger(Box::new(StdoutLoopLogger::default()));
    let camera = CameraController::new(Box::new(FfmpegCamera::new()), capture_request(&cli));

    let mut session = FaceCamSession::new(camera, detection);
    session.load_detector(detector);
    session.start_camera()?;

    let snapshots = cli
        .snapshot_dir
        .as_deref()
        .map(|dir| Snapshotter::new(dir, session.sink(), overlay.clone()));
    run_for(&session, cli.duration_secs, snapshots)?;

    let frames = session.sink().frames_presented();
    session.stop_camera();
    log::info!(
        "Done: {frames} frames shown, {} detection ticks ({} skipped)",
        session.detection().ticks_completed(),
        session.detection().ticks_skipped()
    );
    Ok(())
}

fn run_for(
    session: &FaceCamSession,
    duration_secs: u64,
    mut snapshots: Option<Snapshotter>,
) -> Result<(), Box<dyn std::error::Error>> {
    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(());
        }
        thread::sleep(SNAPSHOT_PERIOD);
        if !session.is_camera_active() {
            return Err("camera stopped unexpectedly".into());
        }
        if let Some(snapshots) = snapshots.as_mut() {
            snapshots.capture()?;
        }
    }
}

/// Periodically composites the current frame and overlay to disk.
struct Snapshotter {
    dir: PathBuf,
    sink: Arc<VideoSink>,
    overlay: Arc<Mutex<RgbaOverlay>>,
    writer: SnapshotWriter,
    count: usize,
}

impl Snapshotter {
    fn new(
        dir: &Path,
        sink: Arc<VideoSink>,
        overlay: Arc<Mutex<RgbaOverlay>>,
    ) -> Self {
        Self {
            dir: dir.to_path_buf(),
            sink,
            overlay,
            writer: SnapshotWriter::new(),
            count: 0,
        }
    }

    fn capture(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(frame) = self.sink.current_frame() else {
            return Ok(());
        };
        let layer = self
            .overlay
            .lock()
            .map_err(|_| "overlay lock poisoned")?
            .image()
            .clone();
        let path = self.dir.join(format!("snapshot_{:04}.png", self.count));
        self.writer.write(&path, &frame, &layer)?;
        log::info!("Wrote {}", path.display());
        self.count += 1;
        Ok(())
    }
}

fn capture_request(cli: &Cli) -> CaptureRequest {
    let source = match &cli.file {
        Some(path) => CaptureSource::File(path.clone()),
        None => CaptureSource::Device {
            format: cli.input_format.clone(),
            name: cli
                .device
                .clone()
                .unwrap_or_else(|| ffmpeg_camera::default_device_name().to_string()),
        },
    };
    CaptureRequest::new(source)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(file) = &cli.file {
        if !file.exists() {
            return Err(format!("Input file not found: {}", file.display()).into());
        }
    }
    let kind: DetectorKind = cli.detector.parse()?;
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {confidence}"
            )
            .into());
        }
    }
    if cli.interval_ms == 0 {
        return Err("Interval must be at least 1 ms".into());
    }
    log::debug!("Using {kind} detector");
    Ok(())
}

fn print_devices() {
    let devices = ffmpeg_camera::list_devices();
    if devices.is_empty() {
        println!(
            "No devices found; try --device with --input-format {}",
            ffmpeg_camera::default_input_format()
        );
    }
    for device in devices {
        println!("{device}");
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
