use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crate::camera::domain::camera_backend::{
    CameraBackend, CaptureRequest, CaptureSource, StreamMetadata, VideoStream,
};
use crate::camera::domain::camera_error::CameraError;
use crate::shared::frame::Frame;

/// Opens cameras through libavdevice, or plays a video file as a camera.
///
/// Decoded frames are converted to RGB24.
#[derive(Default)]
pub struct FfmpegCamera;

impl FfmpegCamera {
    pub fn new() -> Self {
        Self
    }
}

impl CameraBackend for FfmpegCamera {
    fn acquire(&mut self, request: &CaptureRequest) -> Result<Box<dyn VideoStream>, CameraError> {
        ffmpeg_next::init().map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;
        ffmpeg_next::device::register_all();
        let stream = FfmpegCameraStream::open(request)?;
        Ok(Box::new(stream))
    }
}

/// The platform's default capture input format.
pub fn default_input_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "v4l2"
    }
}

/// Best-effort list of capture device names for the default input format.
pub fn list_devices() -> Vec<String> {
    #[cfg(target_os = "linux")]
    {
        let mut devices: Vec<String> = std::fs::read_dir("/dev")
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with("video"))
                    })
                    .map(|p| p.display().to_string())
                    .collect()
            })
            .unwrap_or_default();
        devices.sort();
        devices
    }
    #[cfg(not(target_os = "linux"))]
    {
        Vec::new()
    }
}

/// Device name used when the caller does not name one.
pub fn default_device_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "0"
    } else if cfg!(target_os = "windows") {
        "video=Integrated Camera"
    } else {
        "/dev/video0"
    }
}

struct Decoding {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
}

/// A live ffmpeg input. File sources loop and are paced to their frame rate.
pub struct FfmpegCameraStream {
    source: CaptureSource,
    decoding: Option<Decoding>,
    metadata: StreamMetadata,
    sequence: u64,
    /// `Some` for file sources, which would otherwise decode as fast as possible.
    frame_interval: Option<Duration>,
    last_frame_at: Option<Instant>,
    flushing: bool,
}

// Safety: the stream is used from one thread at a time (moved into the
// playback thread and back); ffmpeg's raw pointers are never shared.
unsafe impl Send for FfmpegCameraStream {}

impl FfmpegCameraStream {
    fn open(request: &CaptureRequest) -> Result<Self, CameraError> {
        let input = open_input(request)?;
        let (decoding, metadata) = start_decoding(input, &request.source)?;

        let frame_interval = match request.source {
            CaptureSource::File(_) if metadata.fps > 0.0 => {
                Some(Duration::from_secs_f64(1.0 / metadata.fps))
            }
            CaptureSource::File(_) => Some(Duration::from_millis(33)),
            CaptureSource::Device { .. } => None,
        };

        Ok(Self {
            source: request.source.clone(),
            decoding: Some(decoding),
            metadata,
            sequence: 0,
            frame_interval,
            last_frame_at: None,
            flushing: false,
        })
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let Some(dec) = self.decoding.as_mut() else {
            return Ok(None);
        };
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if dec.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        dec.scaler.run(&decoded, &mut rgb_frame)?;
        let (width, height) = (rgb_frame.width(), rgb_frame.height());
        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        let frame = Frame::new(pixels, width, height, 3, self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    /// Reopens a file source from the beginning.
    fn rewind(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let CaptureSource::File(ref path) = self.source else {
            return Err("only file sources can be rewound".into());
        };
        let input = ffmpeg_next::format::input(path)?;
        let (decoding, _) = start_decoding(input, &self.source)?;
        self.decoding = Some(decoding);
        self.flushing = false;
        Ok(())
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame_at) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn next_decoded(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        loop {
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }

            if self.decoding.is_none() {
                return Ok(None);
            }
            if self.flushing {
                if matches!(self.source, CaptureSource::File(_)) {
                    self.rewind()?;
                    continue;
                }
                return Ok(None);
            }
            let Some(dec) = self.decoding.as_mut() else {
                return Ok(None);
            };

            let next = dec
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) => {
                    if index != dec.stream_index {
                        continue;
                    }
                    if let Err(e) = dec.decoder.send_packet(&packet) {
                        log::debug!("Dropping undecodable packet: {e}");
                    }
                }
                None => {
                    let _ = dec.decoder.send_eof();
                    self.flushing = true;
                }
            }
        }
    }
}

impl VideoStream for FfmpegCameraStream {
    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let frame = self.next_decoded()?;
        if frame.is_some() {
            self.pace();
        }
        Ok(frame)
    }

    fn stop(&mut self) {
        if self.decoding.take().is_some() {
            log::debug!("Released {}", self.source);
        }
    }

    fn is_live(&self) -> bool {
        self.decoding.is_some()
    }
}

impl Drop for FfmpegCameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_input(request: &CaptureRequest) -> Result<ffmpeg_next::format::context::Input, CameraError> {
    match &request.source {
        CaptureSource::File(path) => ffmpeg_next::format::input(path)
            .map_err(|e| CameraError::DeviceUnavailable(format!("{}: {e}", path.display()))),
        CaptureSource::Device { format, name } => {
            let format_name = format.as_deref().unwrap_or(default_input_format());
            let input_format = ffmpeg_next::device::input::video()
                .find(|f| f.name() == format_name)
                .ok_or_else(|| {
                    CameraError::DeviceUnavailable(format!(
                        "input format {format_name} is not available in this ffmpeg build"
                    ))
                })?;

            let mut options = ffmpeg_next::Dictionary::new();
            if let (Some(w), Some(h)) = (request.width, request.height) {
                options.set("video_size", &format!("{w}x{h}"));
            }
            if let Some(fps) = request.fps {
                options.set("framerate", &fps.to_string());
            }

            let path = PathBuf::from(name);
            match ffmpeg_next::format::open_with(&path, &input_format, options) {
                Ok(ffmpeg_next::format::context::Context::Input(input)) => Ok(input),
                Ok(_) => Err(CameraError::DeviceUnavailable(format!(
                    "{name}: {format_name} did not open as an input"
                ))),
                Err(e) => Err(classify_open_error(name, e)),
            }
        }
    }
}

/// Maps an ffmpeg open failure to the camera error a user can act on.
fn classify_open_error(name: &str, e: ffmpeg_next::Error) -> CameraError {
    let message = format!("{name}: {e}");
    let lower = message.to_lowercase();
    if lower.contains("permission denied") || lower.contains("operation not permitted") {
        CameraError::AccessDenied(message)
    } else {
        CameraError::DeviceUnavailable(message)
    }
}

fn start_decoding(
    input: ffmpeg_next::format::context::Input,
    source: &CaptureSource,
) -> Result<(Decoding, StreamMetadata), CameraError> {
    let stream_err = |e: ffmpeg_next::Error| CameraError::Stream(e.to_string());

    let stream = input
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or_else(|| CameraError::Stream(format!("{source}: no video stream")))?;
    let stream_index = stream.index();
    let rate = stream.rate();
    let codec_ctx =
        ffmpeg_next::codec::context::Context::from_parameters(stream.parameters()).map_err(stream_err)?;
    let decoder = codec_ctx.decoder().video().map_err(stream_err)?;

    let width = decoder.width();
    let height = decoder.height();
    if width == 0 || height == 0 {
        return Err(CameraError::Stream(format!("{source}: stream reports no dimensions")));
    }

    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg_next::format::Pixel::RGB24,
        width,
        height,
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )
    .map_err(stream_err)?;

    let fps = if rate.denominator() != 0 {
        rate.numerator() as f64 / rate.denominator() as f64
    } else {
        0.0
    };
    let metadata = StreamMetadata {
        width,
        height,
        fps,
        codec: decoder
            .codec()
            .map(|c| c.name().to_string())
            .unwrap_or_default(),
        description: source.to_string(),
    };

    Ok((
        Decoding {
            input,
            decoder,
            scaler,
            stream_index,
        },
        metadata,
    ))
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg rows may be padded (stride > width*3); the padding is stripped.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
