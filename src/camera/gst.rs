use crate::camera::{CameraOpener, FrameSource};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::Frame;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;

/// GStreamer-backed camera source reading RGB frames from a V4L2 device.
pub struct GstFrameSource {
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    dimensions: (u32, u32),
    frame_counter: u64,
}

impl GstFrameSource {
    fn open(config: &CameraConfig, index: u32) -> Result<Self> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let (width, height) = config.resolution;
        let pipeline_desc = format!(
            "v4l2src device=/dev/video{} ! \
             videoconvert ! \
             videoscale ! \
             video/x-raw,format=RGB,width={},height={},framerate={}/1 ! \
             appsink name=sink sync=false max-buffers=1 drop=true",
            index, width, height, config.fps
        );

        debug!("Creating camera pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::DeviceOpen {
                index,
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::DeviceOpen {
                index,
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::DeviceOpen {
                index,
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::DeviceOpen {
                index,
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::DeviceOpen {
                index,
                details: format!("Failed to start pipeline: {}", e),
            })?;

        // Wait for the pipeline to actually reach Playing so an invalid
        // device index fails the open instead of the first read.
        let (res, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(5));
        if let Err(e) = res {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::DeviceOpen {
                index,
                details: format!("Pipeline did not reach Playing: {}", e),
            }
            .into());
        }

        info!(
            "Camera {} opened at {}x{} @ {}fps",
            index, width, height, config.fps
        );

        Ok(Self {
            pipeline: Some(pipeline),
            appsink: Some(appsink),
            dimensions: (width, height),
            frame_counter: 0,
        })
    }
}

impl FrameSource for GstFrameSource {
    fn read(&mut self) -> Result<Frame> {
        let appsink = self.appsink.as_ref().ok_or_else(|| CameraError::ReadFailure {
            details: "Camera already closed".to_string(),
        })?;

        let timeout = gstreamer::ClockTime::from_seconds(2);
        let sample = appsink
            .try_pull_sample(timeout)
            .ok_or_else(|| CameraError::ReadFailure {
                details: "No sample from camera (timeout or end of stream)".to_string(),
            })?;

        let buffer = sample.buffer().ok_or_else(|| CameraError::ReadFailure {
            details: "Sample contained no buffer".to_string(),
        })?;

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::ReadFailure {
                details: format!("Failed to map buffer: {}", e),
            })?;

        self.frame_counter += 1;
        let (width, height) = self.dimensions;
        let frame = Frame::new(
            self.frame_counter,
            SystemTime::now(),
            map.as_slice().to_vec(),
            width,
            height,
        );

        if !frame.validate_size() {
            return Err(CameraError::ReadFailure {
                details: format!(
                    "Unexpected frame size: got {} bytes, expected {}",
                    frame.data.len(),
                    frame.expected_size()
                ),
            }
            .into());
        }

        Ok(frame)
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            debug!("Stopping camera pipeline");
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop camera pipeline cleanly: {}", e);
            }
        }
        self.appsink = None;
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens `GstFrameSource` handles for real V4L2 devices.
pub struct GstCameraOpener {
    config: CameraConfig,
}

impl GstCameraOpener {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

impl CameraOpener for GstCameraOpener {
    fn open(&self, index: u32) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(GstFrameSource::open(&self.config, index)?))
    }
}
