use crate::config::ExpressionConfig;
use crate::detect::{Annotation, Detection, FeatureSample, FrameAnalyzer, BLUE, GREEN, RED, YELLOW};
use crate::error::Result;
use crate::frame::Frame;
use std::fmt;
use tracing::{trace, warn};

/// Landmark indices consumed from the face mesh (MediaPipe layout).
pub const MOUTH_LEFT: usize = 61;
pub const MOUTH_RIGHT: usize = 291;
pub const UPPER_LIP: usize = 13;
pub const LOWER_LIP: usize = 14;
pub const NOSE_TIP: usize = 1;

/// Fixed-size ordered set of normalized (x, y) facial points for one face.
/// Produced fresh per frame; no identity is tracked across frames.
#[derive(Debug, Clone)]
pub struct LandmarkSet {
    points: Vec<(f32, f32)>,
}

impl LandmarkSet {
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Option<(f32, f32)> {
        self.points.get(index).copied()
    }

    /// Whether all the mouth/nose indices the heuristic needs are present
    pub fn has_mouth_points(&self) -> bool {
        self.points.len() > MOUTH_RIGHT
    }
}

/// Categorical expression read from the mouth geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionLabel {
    Smiling,
    Frowning,
    Neutral,
    NoFace,
}

impl fmt::Display for ExpressionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExpressionLabel::Smiling => "Smiling",
            ExpressionLabel::Frowning => "Frowning",
            ExpressionLabel::Neutral => "Neutral",
            ExpressionLabel::NoFace => "No face detected",
        };
        f.write_str(text)
    }
}

/// Produces at most one landmark set per frame. The model behind this seam
/// is the face mesh ONNX network; tests substitute scripted landmarks.
pub trait FaceLandmarker: Send {
    fn landmarks(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>>;
}

/// Smile/frown score for one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpressionScore {
    pub smile: f32,
    pub label: ExpressionLabel,
    pub corner_lift: f32,
    pub mouth_width: f32,
}

/// Score smile vs. frown from mouth landmarks.
///
/// `corner_lift` is how many pixels the mouth corners sit above the lip
/// center: positive reads as a smile, negative as a frown. The thresholds
/// are asymmetric (smile needs more lift than a frown needs droop). Mouth
/// width is measured but does not participate in the score.
pub fn score_smile_frown(
    landmarks: &LandmarkSet,
    frame_width: u32,
    frame_height: u32,
    config: &ExpressionConfig,
) -> Option<ExpressionScore> {
    let (lx, ly) = landmarks.point(MOUTH_LEFT)?;
    let (rx, ry) = landmarks.point(MOUTH_RIGHT)?;
    let (_ux, uy) = landmarks.point(UPPER_LIP)?;
    let (_dx, dy) = landmarks.point(LOWER_LIP)?;
    let _nose = landmarks.point(NOSE_TIP)?;

    let w = frame_width as f32;
    let h = frame_height as f32;

    let mouth_width = ((rx - lx) * w).hypot((ry - ly) * h);

    let mouth_corners_y = (ly + ry) / 2.0;
    let mouth_center_y = (uy + dy) / 2.0;
    let corner_lift = (mouth_center_y - mouth_corners_y) * h;

    let (smile, label) = if corner_lift > config.smile_threshold_px {
        ((0.5 + corner_lift / 20.0).min(1.0), ExpressionLabel::Smiling)
    } else if corner_lift < -config.frown_threshold_px {
        ((0.5 + corner_lift / 20.0).max(0.0), ExpressionLabel::Frowning)
    } else {
        (0.5, ExpressionLabel::Neutral)
    };

    Some(ExpressionScore {
        smile,
        label,
        corner_lift,
        mouth_width,
    })
}

/// Reads facial expression from mouth landmarks. Only the first detected
/// face is scored; additional faces in frame are not consulted.
pub struct ExpressionDetector {
    landmarker: Box<dyn FaceLandmarker>,
    config: ExpressionConfig,
}

impl ExpressionDetector {
    pub fn new(landmarker: Box<dyn FaceLandmarker>, config: ExpressionConfig) -> Self {
        Self { landmarker, config }
    }

    fn no_face_detection(&self) -> Detection {
        Detection {
            sample: FeatureSample::Expression {
                smile: 0.5,
                label: ExpressionLabel::NoFace,
                corner_lift: 0.0,
                mouth_width: 0.0,
            },
            annotations: vec![Annotation::Text {
                position: (10, 30),
                text: ExpressionLabel::NoFace.to_string(),
                color: RED,
            }],
        }
    }
}

impl FrameAnalyzer for ExpressionDetector {
    fn analyze(&mut self, frame: &Frame) -> Detection {
        let landmarks = match self.landmarker.landmarks(frame) {
            Ok(Some(set)) if set.has_mouth_points() => set,
            Ok(Some(set)) => {
                // A set too short for the mouth indices is a model-contract
                // violation, not an absent face; degrade but say so
                warn!(
                    "Landmark set on frame {} has only {} points, treating as no face",
                    frame.id,
                    set.len()
                );
                return self.no_face_detection();
            }
            Ok(None) => return self.no_face_detection(),
            Err(e) => {
                // A model failure degrades to the no-face branch rather
                // than stopping the stream
                warn!("Landmark model failed on frame {}: {}", frame.id, e);
                return self.no_face_detection();
            }
        };

        let score = match score_smile_frown(&landmarks, frame.width, frame.height, &self.config) {
            Some(score) => score,
            None => return self.no_face_detection(),
        };

        trace!(
            "Frame {}: {} (lift {:.2}px, smile {:.2})",
            frame.id,
            score.label,
            score.corner_lift,
            score.smile
        );

        let w = frame.width as f32;
        let h = frame.height as f32;
        let to_px = |(nx, ny): (f32, f32)| (nx * w, ny * h);

        let mut annotations = Vec::new();
        for (index, color) in [
            (MOUTH_LEFT, GREEN),
            (MOUTH_RIGHT, GREEN),
            (UPPER_LIP, BLUE),
            (LOWER_LIP, BLUE),
        ] {
            if let Some(point) = landmarks.point(index) {
                annotations.push(Annotation::Disc {
                    center: to_px(point),
                    radius: 5,
                    color,
                });
            }
        }
        annotations.push(Annotation::Text {
            position: (10, 30),
            text: format!("Expression: {}", score.label),
            color: GREEN,
        });
        annotations.push(Annotation::Text {
            position: (10, 70),
            text: format!("Smile Value: {:.2}", score.smile),
            color: GREEN,
        });
        annotations.push(Annotation::Text {
            position: (10, 110),
            text: format!("Corner Lift: {:.2}", score.corner_lift),
            color: YELLOW,
        });

        Detection {
            sample: FeatureSample::Expression {
                smile: score.smile,
                label: score.label,
                corner_lift: score.corner_lift,
                mouth_width: score.mouth_width,
            },
            annotations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExpressionConfig;
    use std::time::SystemTime;

    const FRAME_W: u32 = 640;
    // Power-of-two height: the threshold lifts (5.0, 3.0) divided by 512
    // are exact in f32, so boundary tests hit the thresholds exactly
    const FRAME_H: u32 = 512;

    /// Landmark set with the mouth corners at `corners_y` and the lip center
    /// at `center_y` (normalized coordinates). All other points are filler.
    fn mouth_landmarks(corners_y: f32, center_y: f32) -> LandmarkSet {
        let mut points = vec![(0.5f32, 0.5f32); 468];
        points[MOUTH_LEFT] = (0.4, corners_y);
        points[MOUTH_RIGHT] = (0.6, corners_y);
        points[UPPER_LIP] = (0.5, center_y);
        points[LOWER_LIP] = (0.5, center_y);
        points[NOSE_TIP] = (0.5, 0.4);
        LandmarkSet::new(points)
    }

    /// Landmarks whose corner lift is exactly `lift_px` on a 512px frame
    fn landmarks_with_lift(lift_px: f32) -> LandmarkSet {
        let center_y = 0.6;
        let corners_y = center_y - lift_px / FRAME_H as f32;
        mouth_landmarks(corners_y, center_y)
    }

    fn score(lift_px: f32) -> ExpressionScore {
        score_smile_frown(
            &landmarks_with_lift(lift_px),
            FRAME_W,
            FRAME_H,
            &ExpressionConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_lift_ten_saturates_to_full_smile() {
        let s = score(10.0);
        assert_eq!(s.label, ExpressionLabel::Smiling);
        assert!((s.smile - 1.0).abs() < 1e-4);
        assert!((s.corner_lift - 10.0).abs() < 1e-2);
    }

    #[test]
    fn test_moderate_lift_scales_linearly() {
        let s = score(6.0);
        assert_eq!(s.label, ExpressionLabel::Smiling);
        assert!((s.smile - 0.8).abs() < 1e-2);
    }

    #[test]
    fn test_lift_at_smile_threshold_is_neutral() {
        // The smile branch requires strictly more than 5px
        let s = score(5.0);
        assert_eq!(s.corner_lift, 5.0);
        assert_eq!(s.label, ExpressionLabel::Neutral);
        assert_eq!(s.smile, 0.5);
    }

    #[test]
    fn test_droop_at_frown_threshold_is_neutral() {
        // The frown branch requires strictly less than -3px
        let s = score(-3.0);
        assert_eq!(s.corner_lift, -3.0);
        assert_eq!(s.label, ExpressionLabel::Neutral);
        assert_eq!(s.smile, 0.5);
    }

    #[test]
    fn test_droop_past_threshold_is_frown() {
        let s = score(-4.0);
        assert_eq!(s.label, ExpressionLabel::Frowning);
        assert!((s.smile - 0.3).abs() < 1e-2);
    }

    #[test]
    fn test_deep_frown_clamps_to_zero() {
        let s = score(-20.0);
        assert_eq!(s.label, ExpressionLabel::Frowning);
        assert_eq!(s.smile, 0.0);
    }

    #[test]
    fn test_mouth_width_is_measured_but_not_scored() {
        let lms = landmarks_with_lift(0.0);
        let s = score_smile_frown(&lms, FRAME_W, FRAME_H, &ExpressionConfig::default()).unwrap();
        // Corners at x 0.4 and 0.6 on a 640px frame: 128px apart
        assert!((s.mouth_width - 128.0).abs() < 1.0);
        assert_eq!(s.smile, 0.5);
    }

    struct ScriptedLandmarker(Vec<Option<LandmarkSet>>);

    impl FaceLandmarker for ScriptedLandmarker {
        fn landmarks(&mut self, _frame: &Frame) -> Result<Option<LandmarkSet>> {
            if self.0.is_empty() {
                Ok(None)
            } else {
                Ok(self.0.remove(0))
            }
        }
    }

    fn blank_frame() -> Frame {
        Frame::new(
            1,
            SystemTime::now(),
            vec![0u8; (FRAME_W * FRAME_H * 3) as usize],
            FRAME_W,
            FRAME_H,
        )
    }

    #[test]
    fn test_no_face_yields_neutral_value_and_cleared_flag() {
        let mut detector = ExpressionDetector::new(
            Box::new(ScriptedLandmarker(vec![None])),
            ExpressionConfig::default(),
        );
        let detection = detector.analyze(&blank_frame());

        match detection.sample {
            FeatureSample::Expression {
                smile,
                label,
                corner_lift,
                ..
            } => {
                assert_eq!(smile, 0.5);
                assert_eq!(label, ExpressionLabel::NoFace);
                assert_eq!(corner_lift, 0.0);
            }
            other => panic!("unexpected sample: {:?}", other),
        }
        assert_eq!(
            detection.sample.messages(),
            vec![("/face/smile", 0.5), ("/face/expression", 0.0)]
        );
    }

    #[test]
    fn test_detected_face_flows_through_to_messages() {
        let mut detector = ExpressionDetector::new(
            Box::new(ScriptedLandmarker(vec![Some(landmarks_with_lift(10.0))])),
            ExpressionConfig::default(),
        );
        let detection = detector.analyze(&blank_frame());
        let messages = detection.sample.messages();
        assert_eq!(messages[0].0, "/face/smile");
        assert!((messages[0].1 - 1.0).abs() < 1e-4);
        assert_eq!(messages[1], ("/face/expression", 1.0));
    }

    #[test]
    fn test_truncated_landmark_set_reads_as_no_face() {
        let mut detector = ExpressionDetector::new(
            Box::new(ScriptedLandmarker(vec![Some(LandmarkSet::new(vec![
                (0.5, 0.5);
                10
            ]))])),
            ExpressionConfig::default(),
        );
        let detection = detector.analyze(&blank_frame());
        match detection.sample {
            FeatureSample::Expression { label, .. } => {
                assert_eq!(label, ExpressionLabel::NoFace)
            }
            other => panic!("unexpected sample: {:?}", other),
        }
    }
}
