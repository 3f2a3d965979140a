//! MediaPipe Face Mesh ONNX inference behind the `FaceLandmarker` seam.
//!
//! The model consumes a 192x192 RGB crop normalized to [-1, 1] and returns
//! 468 landmarks plus a face presence score. The whole frame is used as the
//! crop: the operator sits in front of the webcam, so a separate face
//! detector stage is not worth its weight here. Landmarks come back in
//! input-crop pixels and are normalized to [0, 1] frame coordinates.

use crate::config::ExpressionConfig;
use crate::detect::expression::{FaceLandmarker, LandmarkSet};
use crate::error::{DetectorError, Result};
use crate::frame::Frame;
use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};

const INPUT_SIZE: u32 = 192;
const LANDMARK_COUNT: usize = 468;

/// ONNX Runtime wrapper for the face mesh landmark model.
pub struct FaceMeshLandmarker {
    session: Session,
    score_min: f32,
}

impl FaceMeshLandmarker {
    pub fn load(config: &ExpressionConfig) -> Result<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(DetectorError::LandmarkModel {
                details: format!("Face mesh model not found at {}", model_path.display()),
            }
            .into());
        }

        let model_bytes = std::fs::read(model_path).map_err(|e| DetectorError::LandmarkModel {
            details: format!("Failed to read model file: {}", e),
        })?;

        let session = Session::builder()
            .map_err(|e| DetectorError::LandmarkModel {
                details: format!("ORT session builder: {}", e),
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectorError::LandmarkModel {
                details: format!("ORT optimization level: {}", e),
            })?
            .commit_from_memory(model_bytes.as_slice())
            .map_err(|e| DetectorError::LandmarkModel {
                details: format!("ORT load model: {}", e),
            })?;

        Ok(Self {
            session,
            score_min: config.face_score_min,
        })
    }

    /// Resize the frame to the model input and pack a [-1,1] CHW tensor
    fn preprocess(&self, frame: &Frame) -> Result<Value> {
        let rgb = frame
            .to_rgb_image()
            .ok_or_else(|| DetectorError::FrameProcessing {
                details: "Frame buffer does not match its dimensions".to_string(),
            })?;

        let resized = image::imageops::resize(
            &rgb,
            INPUT_SIZE,
            INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );

        let (w, h) = (INPUT_SIZE as usize, INPUT_SIZE as usize);
        let mut chw = Vec::with_capacity(3 * w * h);
        let raw = resized.as_raw();
        // HWC -> CHW
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let v = raw[(y * w + x) * 3 + c] as f32 / 255.0;
                    chw.push(v * 2.0 - 1.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| {
                DetectorError::FrameProcessing {
                    details: format!("ORT tensor: {}", e),
                }
                .into()
            })
    }
}

impl FaceLandmarker for FaceMeshLandmarker {
    fn landmarks(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>> {
        let tensor = self.preprocess(frame)?;

        let outputs =
            self.session
                .run(ort::inputs![tensor])
                .map_err(|e| DetectorError::LandmarkModel {
                    details: format!("ORT run failed: {}", e),
                })?;

        let mut landmark_data: Option<Vec<f32>> = None;
        let mut face_score: Option<f32> = None;

        for (_, value) in outputs.iter() {
            let (_, data) =
                value
                    .try_extract_tensor::<f32>()
                    .map_err(|e| DetectorError::LandmarkModel {
                        details: format!("ORT extract: {}", e),
                    })?;

            if data.len() >= LANDMARK_COUNT * 3 && landmark_data.is_none() {
                landmark_data = Some(data.to_vec());
            } else if data.len() == 1 && face_score.is_none() {
                // Presence logit; squash to a probability
                face_score = Some(1.0 / (1.0 + (-data[0]).exp()));
            }
        }

        let data = landmark_data.ok_or_else(|| DetectorError::LandmarkModel {
            details: "Model returned no landmark tensor".to_string(),
        })?;

        if let Some(score) = face_score {
            if score < self.score_min {
                return Ok(None);
            }
        }

        // Landmarks arrive as (x, y, z) triples in input-crop pixels
        let scale = INPUT_SIZE as f32;
        let points = (0..LANDMARK_COUNT)
            .map(|i| (data[i * 3] / scale, data[i * 3 + 1] / scale))
            .collect();

        Ok(Some(LandmarkSet::new(points)))
    }
}
