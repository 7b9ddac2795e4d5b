pub mod camera_backend;
pub mod camera_controller;
pub mod camera_error;
pub mod video_sink;
