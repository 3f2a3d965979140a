use std::sync::Arc;
use std::time::SystemTime;

/// One captured video frame in packed RGB24.
///
/// Frames are transient: each one is consumed by a single detector pass,
/// optionally annotated for the preview, and then dropped. The pixel data is
/// shared so the renderer can clone cheaply.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic frame identifier within a run
    pub id: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    /// Raw RGB24 data, row-major, 3 bytes per pixel
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Frame {
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Expected byte length for the frame dimensions
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Validate the data length against the frame dimensions
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// RGB triple at (x, y). Callers stay in bounds; debug builds assert.
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        debug_assert!(x < self.width && y < self.height);
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        (self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }

    /// View the frame as an owned `image::RgbImage` for drawing and resizing
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.as_ref().clone())
    }
}
