use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera access denied: {0}")]
    AccessDenied(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("camera stream failed: {0}")]
    Stream(String),
    #[error("timed out waiting for video data")]
    NotReady,
}
