use crate::error::Result;
use image::RgbImage;

/// The operator preview surface.
///
/// The open state is an explicit query: the frame loop checks it every
/// iteration, and a closed window reads the same as an operator stop.
pub trait DisplaySurface: Send {
    /// Present one annotated frame
    fn present(&mut self, image: &RgbImage) -> Result<()>;

    /// Whether the surface can still show frames
    fn is_open(&self) -> bool;

    /// Tear the surface down. Idempotent.
    fn close(&mut self);
}

/// Discards frames; used for headless runs and tests.
pub struct NullDisplay {
    open: bool,
}

impl NullDisplay {
    pub fn new() -> Self {
        Self { open: true }
    }
}

impl Default for NullDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for NullDisplay {
    fn present(&mut self, _image: &RgbImage) -> Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(all(target_os = "linux", feature = "display"))]
pub use gst_window::GstDisplay;

#[cfg(all(target_os = "linux", feature = "display"))]
mod gst_window {
    use super::DisplaySurface;
    use crate::error::{DisplayError, Result};
    use gstreamer::prelude::*;
    use gstreamer::Pipeline;
    use gstreamer_app::AppSrc;
    use image::RgbImage;
    use tracing::{debug, info, warn};

    /// GStreamer-backed preview window (`appsrc -> autovideosink`).
    pub struct GstDisplay {
        pipeline: Option<Pipeline>,
        appsrc: Option<AppSrc>,
        dimensions: (u32, u32),
        closed: bool,
    }

    impl GstDisplay {
        pub fn open(width: u32, height: u32) -> Result<Self> {
            gstreamer::init().map_err(|e| DisplayError::Pipeline {
                details: format!("Failed to initialize GStreamer: {}", e),
            })?;

            let pipeline_desc = format!(
                "appsrc name=src format=time is-live=true \
                 caps=video/x-raw,format=RGB,width={},height={},framerate=0/1 ! \
                 videoconvert ! \
                 autovideosink sync=false",
                width, height
            );

            debug!("Creating preview pipeline: {}", pipeline_desc);

            let pipeline = gstreamer::parse::launch(&pipeline_desc)
                .map_err(|e| DisplayError::Pipeline {
                    details: format!("Failed to create pipeline: {}", e),
                })?
                .downcast::<Pipeline>()
                .map_err(|_| DisplayError::Pipeline {
                    details: "Failed to downcast to Pipeline".to_string(),
                })?;

            let appsrc = pipeline
                .by_name("src")
                .ok_or_else(|| DisplayError::Pipeline {
                    details: "Failed to get appsrc element".to_string(),
                })?
                .downcast::<AppSrc>()
                .map_err(|_| DisplayError::Pipeline {
                    details: "Failed to downcast to AppSrc".to_string(),
                })?;

            pipeline
                .set_state(gstreamer::State::Playing)
                .map_err(|e| DisplayError::Pipeline {
                    details: format!("Failed to start preview pipeline: {}", e),
                })?;

            info!("Preview window opened at {}x{}", width, height);

            Ok(Self {
                pipeline: Some(pipeline),
                appsrc: Some(appsrc),
                dimensions: (width, height),
                closed: false,
            })
        }

        /// Drain the pipeline bus; an error or end-of-stream means the
        /// window is gone (e.g. the operator clicked close).
        fn poll_bus(&mut self) {
            let Some(pipeline) = &self.pipeline else {
                return;
            };
            let Some(bus) = pipeline.bus() else {
                return;
            };
            while let Some(message) = bus.pop() {
                use gstreamer::MessageView;
                match message.view() {
                    MessageView::Eos(_) => {
                        info!("Preview window reached end of stream");
                        self.closed = true;
                    }
                    MessageView::Error(err) => {
                        warn!("Preview window error: {}", err.error());
                        self.closed = true;
                    }
                    _ => {}
                }
            }
        }
    }

    impl DisplaySurface for GstDisplay {
        fn present(&mut self, image: &RgbImage) -> Result<()> {
            self.poll_bus();
            if self.closed {
                return Ok(());
            }

            let (width, height) = self.dimensions;
            if image.dimensions() != (width, height) {
                return Err(DisplayError::Pipeline {
                    details: format!(
                        "Frame size {}x{} does not match window {}x{}",
                        image.width(),
                        image.height(),
                        width,
                        height
                    ),
                }
                .into());
            }

            let Some(appsrc) = &self.appsrc else {
                return Ok(());
            };

            let mut buffer = gstreamer::Buffer::with_size(image.as_raw().len()).map_err(|e| {
                DisplayError::Pipeline {
                    details: format!("Failed to create buffer: {}", e),
                }
            })?;
            {
                let buffer_ref = buffer.get_mut().ok_or_else(|| DisplayError::Pipeline {
                    details: "Buffer not writable".to_string(),
                })?;
                let mut map = buffer_ref
                    .map_writable()
                    .map_err(|e| DisplayError::Pipeline {
                        details: format!("Failed to map buffer: {}", e),
                    })?;
                map.copy_from_slice(image.as_raw());
            }

            if let Err(e) = appsrc.push_buffer(buffer) {
                warn!("Preview push failed, treating window as closed: {:?}", e);
                self.closed = true;
            }

            Ok(())
        }

        fn is_open(&self) -> bool {
            !self.closed && self.pipeline.is_some()
        }

        fn close(&mut self) {
            if let Some(pipeline) = self.pipeline.take() {
                debug!("Stopping preview pipeline");
                if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                    warn!("Failed to stop preview pipeline cleanly: {}", e);
                }
            }
            self.appsrc = None;
            self.closed = true;
        }
    }

    impl Drop for GstDisplay {
        fn drop(&mut self) {
            self.close();
        }
    }
}
