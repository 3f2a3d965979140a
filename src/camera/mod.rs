pub mod mock;

#[cfg(all(target_os = "linux", feature = "camera"))]
pub mod gst;

use crate::error::Result;
use crate::frame::Frame;

pub use mock::{MockCameraOpener, MockFrameSource};

#[cfg(all(target_os = "linux", feature = "camera"))]
pub use gst::{GstCameraOpener, GstFrameSource};

/// An open camera handle producing frames on demand.
///
/// The handle owns an exclusive OS resource. `close()` is idempotent and must
/// run on every exit path; a leaked handle blocks future opens of the same
/// device index.
pub trait FrameSource: Send {
    /// Read the next frame, blocking until one is available
    fn read(&mut self) -> Result<Frame>;

    /// Actual capture dimensions (width, height), fixed per run
    fn dimensions(&self) -> (u32, u32);

    /// Release the camera. Safe to call more than once or on a source whose
    /// read already failed.
    fn close(&mut self);
}

/// Opens camera handles by device index. The seam lets the run lifecycle be
/// exercised without hardware.
pub trait CameraOpener: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn FrameSource>>;
}
