use std::path::PathBuf;

use crate::camera::domain::camera_error::CameraError;
use crate::shared::display_size::DisplaySize;
use crate::shared::frame::Frame;

/// What to capture from.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureSource {
    /// A capture device, e.g. `/dev/video0` with the `v4l2` input format.
    /// `format: None` picks the platform default.
    Device { format: Option<String>, name: String },
    /// A video file played back in a loop at its native rate.
    File(PathBuf),
}

impl std::fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSource::Device {
                format: Some(format),
                name,
            } => write!(f, "{format}:{name}"),
            CaptureSource::Device { format: None, name } => write!(f, "{name}"),
            CaptureSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Camera access request; size and rate are hints the device may ignore.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    pub source: CaptureSource,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
}

impl CaptureRequest {
    pub fn new(source: CaptureSource) -> Self {
        Self {
            source,
            width: None,
            height: None,
            fps: None,
        }
    }
}

/// Stream properties known once the device has been opened.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub description: String,
}

impl StreamMetadata {
    pub fn size(&self) -> DisplaySize {
        DisplaySize::new(self.width, self.height)
    }
}

/// Grants access to a camera.
pub trait CameraBackend: Send {
    /// Opens the requested source. The returned stream already has its
    /// metadata loaded.
    fn acquire(&mut self, request: &CaptureRequest) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// A live video stream handle.
pub trait VideoStream: Send {
    fn metadata(&self) -> &StreamMetadata;

    /// Blocks until the next frame. `Ok(None)` means the stream ended.
    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Stops every track and releases the device. Idempotent.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}
