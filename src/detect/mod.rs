pub mod expression;
pub mod marker;

#[cfg(feature = "facemesh")]
pub mod facemesh;

use crate::emit::{ADDR_EXPRESSION, ADDR_SMILE, ADDR_STICKER_ANGLE};
use crate::frame::Frame;
use image::Rgb;

pub use expression::{ExpressionDetector, ExpressionLabel, FaceLandmarker, LandmarkSet};
pub use marker::MarkerAngleDetector;

/// Scalar feature computed from one frame, ready for emission.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureSample {
    /// Normalized angle between the two tracked markers
    MarkerAngle {
        /// |cos(angle)| in [0, 1]; 0.0 when fewer than two markers qualify
        normalized: f32,
        /// Raw angle in degrees, present only with exactly two markers
        angle_degrees: Option<f32>,
        /// Number of qualifying markers found (0, 1, or 2)
        markers: usize,
    },
    /// Smile intensity from mouth landmarks
    Expression {
        /// 0 = frown, 0.5 = neutral, 1 = smile
        smile: f32,
        label: ExpressionLabel,
        /// Mouth corner lift in pixels (positive = smile)
        corner_lift: f32,
        /// Mouth width in pixels. Informational only; not part of scoring.
        mouth_width: f32,
    },
}

impl FeatureSample {
    /// OSC messages this sample produces, in emission order.
    ///
    /// The expression flag channel is 1.0 only for a smile; frowning and
    /// neutral are both 0.0 there, matching the downstream contract.
    pub fn messages(&self) -> Vec<(&'static str, f32)> {
        match self {
            FeatureSample::MarkerAngle { normalized, .. } => {
                vec![(ADDR_STICKER_ANGLE, *normalized)]
            }
            FeatureSample::Expression { smile, label, .. } => {
                let flag = if *label == ExpressionLabel::Smiling {
                    1.0
                } else {
                    0.0
                };
                vec![(ADDR_SMILE, *smile), (ADDR_EXPRESSION, flag)]
            }
        }
    }
}

/// Overlay primitives the renderer draws for operator feedback.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// Filled disc, e.g. a marker centroid or mouth landmark
    Disc {
        center: (f32, f32),
        radius: i32,
        color: Rgb<u8>,
    },
    /// Line segment, e.g. between the two marker centroids
    Segment {
        from: (f32, f32),
        to: (f32, f32),
        color: Rgb<u8>,
    },
    /// Text row at a fixed position
    Text {
        position: (i32, i32),
        text: String,
        color: Rgb<u8>,
    },
}

/// Result of one detector pass over one frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub sample: FeatureSample,
    pub annotations: Vec<Annotation>,
}

/// Per-frame feature extraction. Implementations keep whatever state they
/// need across frames but never track identity between them.
pub trait FrameAnalyzer: Send {
    fn analyze(&mut self, frame: &Frame) -> Detection;
}

pub(crate) const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub(crate) const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub(crate) const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub(crate) const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
