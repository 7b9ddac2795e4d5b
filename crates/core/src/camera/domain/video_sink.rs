use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::camera::domain::camera_backend::StreamMetadata;
use crate::shared::display_size::DisplaySize;
use crate::shared::frame::Frame;

/// How much of the stream the sink has seen, in increasing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveEnoughData,
}

#[derive(Default)]
struct SinkState {
    metadata: Option<StreamMetadata>,
    frame: Option<Arc<Frame>>,
    frames_presented: u64,
}

impl SinkState {
    fn ready_state(&self) -> ReadyState {
        match (&self.metadata, &self.frame) {
            (None, _) => ReadyState::HaveNothing,
            (Some(_), None) => ReadyState::HaveMetadata,
            (Some(_), Some(_)) => ReadyState::HaveEnoughData,
        }
    }
}

/// Latest-frame slot the camera writes into and detection reads from.
///
/// Shared between the capture thread, the detection timer and the UI.
#[derive(Default)]
pub struct VideoSink {
    state: Mutex<SinkState>,
    changed: Condvar,
}

impl VideoSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Binds a freshly opened stream; any previous frame is discarded.
    pub fn attach(&self, metadata: StreamMetadata) {
        let mut state = self.lock();
        state.metadata = Some(metadata);
        state.frame = None;
        state.frames_presented = 0;
        self.changed.notify_all();
    }

    /// Publishes a decoded frame as the current one.
    pub fn present(&self, frame: Frame) {
        let mut state = self.lock();
        if state.metadata.is_none() {
            return;
        }
        state.frame = Some(Arc::new(frame));
        state.frames_presented += 1;
        self.changed.notify_all();
    }

    /// Unbinds the stream and drops the last frame.
    pub fn detach(&self) {
        let mut state = self.lock();
        *state = SinkState::default();
        self.changed.notify_all();
    }

    pub fn ready_state(&self) -> ReadyState {
        self.lock().ready_state()
    }

    pub fn metadata(&self) -> Option<StreamMetadata> {
        self.lock().metadata.clone()
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.lock().frame.clone()
    }

    pub fn frames_presented(&self) -> u64 {
        self.lock().frames_presented
    }

    /// Intrinsic video size: the current frame's, else the stream metadata's.
    pub fn video_size(&self) -> Option<DisplaySize> {
        let state = self.lock();
        state
            .frame
            .as_ref()
            .map(|f| f.size())
            .or_else(|| state.metadata.as_ref().map(StreamMetadata::size))
    }

    /// Waits until the sink reaches at least `target`. Returns whether it did.
    pub fn wait_for(&self, target: ReadyState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.ready_state() >= target {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
