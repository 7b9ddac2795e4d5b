use std::time::Duration;

pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Short-range BlazeFace; only resolved from the cache or bundled models dir.
pub const BLAZEFACE_MODEL_NAME: &str = "blazeface_short_range.onnx";

/// 68-point landmark network; only resolved from the cache or bundled models dir.
pub const LANDMARK68_MODEL_NAME: &str = "face_landmarks_68.onnx";

/// Directory (relative to the working directory) searched for bundled models.
pub const BUNDLED_MODELS_DIR: &str = "models";

/// Period between detection ticks.
pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_millis(100);

/// How long `start()` waits for the first decoded frame before giving up.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// How long stopping the camera waits for a blocked read before detaching it.
pub const PLAYBACK_STOP_TIMEOUT: Duration = Duration::from_secs(2);
