use crate::camera::{CameraOpener, FrameSource};
use crate::error::{CameraError, Result};
use crate::frame::Frame;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Tracks how many mock camera handles are open, and the high-water mark.
/// Lets lifecycle tests assert the single-handle invariant.
#[derive(Debug, Default)]
pub struct HandleTracker {
    open: AtomicUsize,
    peak: AtomicUsize,
    opened_total: AtomicUsize,
}

impl HandleTracker {
    fn acquire(&self) {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn release(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn peak_handles(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }
}

/// In-memory frame source for tests and headless development.
///
/// Yields the scripted frames in order and fails reads once exhausted,
/// mimicking a camera whose stream ended.
pub struct MockFrameSource {
    frames: Vec<Frame>,
    cursor: usize,
    repeat: bool,
    dimensions: (u32, u32),
    tracker: Arc<HandleTracker>,
    closed: bool,
}

impl MockFrameSource {
    pub fn new(frames: Vec<Frame>, repeat: bool, tracker: Arc<HandleTracker>) -> Self {
        let dimensions = frames
            .first()
            .map(|f| (f.width, f.height))
            .unwrap_or((640, 480));
        tracker.acquire();
        Self {
            frames,
            cursor: 0,
            repeat,
            dimensions,
            tracker,
            closed: false,
        }
    }
}

impl FrameSource for MockFrameSource {
    fn read(&mut self) -> Result<Frame> {
        if self.closed {
            return Err(CameraError::ReadFailure {
                details: "Camera already closed".to_string(),
            }
            .into());
        }
        if self.frames.is_empty() || (!self.repeat && self.cursor >= self.frames.len()) {
            return Err(CameraError::ReadFailure {
                details: "End of scripted stream".to_string(),
            }
            .into());
        }
        let frame = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor += 1;
        Ok(frame)
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.tracker.release();
        }
    }
}

impl Drop for MockFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opener handing out `MockFrameSource` instances from a shared script.
pub struct MockCameraOpener {
    frames: Vec<Frame>,
    repeat: bool,
    fail_open: bool,
    tracker: Arc<HandleTracker>,
}

impl MockCameraOpener {
    pub fn new(frames: Vec<Frame>, repeat: bool) -> Self {
        Self {
            frames,
            repeat,
            fail_open: false,
            tracker: Arc::new(HandleTracker::default()),
        }
    }

    /// Make every `open()` fail, simulating an unavailable device
    pub fn failing() -> Self {
        Self {
            frames: Vec::new(),
            repeat: false,
            fail_open: true,
            tracker: Arc::new(HandleTracker::default()),
        }
    }

    pub fn tracker(&self) -> Arc<HandleTracker> {
        Arc::clone(&self.tracker)
    }
}

impl CameraOpener for MockCameraOpener {
    fn open(&self, index: u32) -> Result<Box<dyn FrameSource>> {
        if self.fail_open {
            return Err(CameraError::DeviceOpen {
                index,
                details: "Mock camera configured to fail".to_string(),
            }
            .into());
        }
        Ok(Box::new(MockFrameSource::new(
            self.frames.clone(),
            self.repeat,
            Arc::clone(&self.tracker),
        )))
    }
}
