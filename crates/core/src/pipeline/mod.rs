pub mod detection_loop;
pub mod face_cam_session;
pub mod loop_logger;
