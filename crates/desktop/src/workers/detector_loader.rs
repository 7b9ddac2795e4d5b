use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use landmark_cam_core::detection::domain::face_detector::FaceDetector;
use landmark_cam_core::detection::infrastructure::detector_factory::{
    build_detector, DetectorOptions,
};

pub enum LoaderMessage {
    DownloadProgress(u64, u64),
    Loaded(Box<dyn FaceDetector>),
    Error(String),
}

/// Loads a detector off the UI thread. Setting the returned flag discards
/// the result.
pub fn spawn(options: DetectorOptions) -> (Receiver<LoaderMessage>, Arc<AtomicBool>) {
    let (tx, rx) = crossbeam_channel::unbounded::<LoaderMessage>();
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = cancelled.clone();

    thread::spawn(move || {
        let message = match load(&tx, &options) {
            Ok(detector) => LoaderMessage::Loaded(detector),
            Err(e) => LoaderMessage::Error(e.to_string()),
        };
        if !cancelled_clone.load(Ordering::Relaxed) {
            let _ = tx.send(message);
        }
    });

    (rx, cancelled)
}

fn load(
    tx: &Sender<LoaderMessage>,
    options: &DetectorOptions,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    let progress_tx = tx.clone();
    build_detector(
        options,
        Some(Box::new(move |downloaded, total| {
            let _ = progress_tx.send(LoaderMessage::DownloadProgress(downloaded, total));
        })),
    )
}
