use crate::config::MarkerConfig;
use crate::detect::{Annotation, Detection, FeatureSample, FrameAnalyzer, BLUE, GREEN, RED};
use crate::frame::Frame;
use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;
use tracing::{debug, trace};

/// A connected red region that passed the area filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Pixel area (zeroth image moment)
    pub area: f32,
    /// Centroid from first moments: (m10/m00, m01/m00)
    pub centroid: (f32, f32),
}

/// Tracks two red stickers and computes the normalized angle between them.
pub struct MarkerAngleDetector {
    config: MarkerConfig,
}

impl MarkerAngleDetector {
    pub fn new(config: MarkerConfig) -> Self {
        Self { config }
    }
}

impl FrameAnalyzer for MarkerAngleDetector {
    fn analyze(&mut self, frame: &Frame) -> Detection {
        let blobs = find_marker_blobs(frame, &self.config);
        trace!("Frame {}: {} qualifying marker blobs", frame.id, blobs.len());

        let mut annotations: Vec<Annotation> = blobs
            .iter()
            .map(|b| Annotation::Disc {
                center: b.centroid,
                radius: 10,
                color: GREEN,
            })
            .collect();

        let sample = if blobs.len() == 2 {
            let (x1, y1) = blobs[0].centroid;
            let (x2, y2) = blobs[1].centroid;

            annotations.push(Annotation::Segment {
                from: (x1, y1),
                to: (x2, y2),
                color: BLUE,
            });

            let dx = x2 - x1;
            let dy = y2 - y1;
            let angle_degrees = dy.atan2(dx).to_degrees();
            let normalized = angle_degrees.to_radians().cos().abs();

            annotations.push(Annotation::Text {
                position: (10, 30),
                text: format!("Angle: {:.1} deg", angle_degrees),
                color: GREEN,
            });
            annotations.push(Annotation::Text {
                position: (10, 70),
                text: format!("AngleNorm: {:.2}", normalized),
                color: GREEN,
            });

            debug!(
                "Frame {}: marker angle {:.1} deg, normalized {:.3}",
                frame.id, angle_degrees, normalized
            );

            FeatureSample::MarkerAngle {
                normalized,
                angle_degrees: Some(angle_degrees),
                markers: 2,
            }
        } else {
            annotations.push(Annotation::Text {
                position: (10, 30),
                text: "Need exactly 2 markers".to_string(),
                color: RED,
            });

            FeatureSample::MarkerAngle {
                normalized: 0.0,
                angle_degrees: None,
                markers: blobs.len(),
            }
        };

        Detection {
            sample,
            annotations,
        }
    }
}

/// Convert an RGB triple to OpenCV-scaled HSV: H in [0, 180), S and V in [0, 255].
pub(crate) fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let rf = r as f32 / 255.0;
    let gf = g as f32 / 255.0;
    let bf = b as f32 / 255.0;

    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue_degrees = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / delta).rem_euclid(6.0))
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    let h = (hue_degrees / 2.0).round().min(179.0) as u8;
    let s = (saturation * 255.0).round() as u8;
    let v = (max * 255.0).round() as u8;
    (h, s, v)
}

/// Build the binary red mask: two hue sub-ranges covering the red
/// wrap-around, OR-combined, each gated on saturation and value.
fn red_mask(frame: &Frame, config: &MarkerConfig) -> GrayImage {
    let mut mask = GrayImage::new(frame.width, frame.height);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let (r, g, b) = frame.rgb(x, y);
            let (h, s, v) = rgb_to_hsv(r, g, b);
            let in_band = (h <= config.hue_low_max || h >= config.hue_high_min)
                && s >= config.saturation_min
                && v >= config.value_min;
            if in_band {
                mask.put_pixel(x, y, Luma([255u8]));
            }
        }
    }
    mask
}

/// Find qualifying marker blobs: connected red regions with area strictly
/// above the minimum, the two largest kept, ordered by descending area with
/// discovery order breaking ties.
pub(crate) fn find_marker_blobs(frame: &Frame, config: &MarkerConfig) -> Vec<Blob> {
    let mask = red_mask(frame, config);
    let components = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    struct Accum {
        count: u64,
        sum_x: f64,
        sum_y: f64,
    }

    // Accumulate moments per label, keeping first-appearance order
    let mut order: Vec<u32> = Vec::new();
    let mut accums: HashMap<u32, Accum> = HashMap::new();
    for (x, y, pixel) in components.enumerate_pixels() {
        let label = pixel[0];
        if label == 0 {
            continue;
        }
        let accum = accums.entry(label).or_insert_with(|| {
            order.push(label);
            Accum {
                count: 0,
                sum_x: 0.0,
                sum_y: 0.0,
            }
        });
        accum.count += 1;
        accum.sum_x += x as f64;
        accum.sum_y += y as f64;
    }

    let mut blobs: Vec<Blob> = Vec::new();
    for label in order {
        let accum = &accums[&label];
        // m00 of a labelled component cannot be zero, but a degenerate
        // moment must skip the blob rather than divide by zero
        if accum.count == 0 {
            continue;
        }
        let area = accum.count as f32;
        if area <= config.min_blob_area {
            continue;
        }
        blobs.push(Blob {
            area,
            centroid: (
                (accum.sum_x / accum.count as f64) as f32,
                (accum.sum_y / accum.count as f64) as f32,
            ),
        });
    }

    // Stable sort: equal areas keep discovery order
    blobs.sort_by(|a, b| b.area.partial_cmp(&a.area).unwrap_or(std::cmp::Ordering::Equal));
    blobs.truncate(2);
    blobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkerConfig;
    use std::time::SystemTime;

    const RED_PIXEL: (u8, u8, u8) = (255, 0, 0);

    /// Black frame with solid red rectangles at the given (x, y, w, h) spots
    fn frame_with_red_rects(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> Frame {
        let mut data = vec![0u8; (width * height * 3) as usize];
        for &(rx, ry, rw, rh) in rects {
            for y in ry..(ry + rh).min(height) {
                for x in rx..(rx + rw).min(width) {
                    let idx = ((y * width + x) * 3) as usize;
                    data[idx] = RED_PIXEL.0;
                    data[idx + 1] = RED_PIXEL.1;
                    data[idx + 2] = RED_PIXEL.2;
                }
            }
        }
        Frame::new(1, SystemTime::now(), data, width, height)
    }

    fn sample_of(frame: &Frame) -> FeatureSample {
        MarkerAngleDetector::new(MarkerConfig::default())
            .analyze(frame)
            .sample
    }

    #[test]
    fn test_rgb_to_hsv_primaries() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        // Grey has zero saturation and must never enter the mask
        assert_eq!(rgb_to_hsv(128, 128, 128).1, 0);
    }

    #[test]
    fn test_high_hue_band_matches_wraparound_red() {
        // A slightly blue-tinted red lands in the [170, 180) band
        let (h, s, v) = rgb_to_hsv(255, 0, 40);
        assert!(h >= 170, "hue {} should be in the wrap-around band", h);
        assert!(s >= 150 && v >= 150);
    }

    #[test]
    fn test_horizontal_pair_normalizes_to_one() {
        let frame = frame_with_red_rects(320, 240, &[(20, 100, 30, 30), (200, 100, 30, 30)]);
        match sample_of(&frame) {
            FeatureSample::MarkerAngle {
                normalized,
                angle_degrees,
                markers,
            } => {
                assert_eq!(markers, 2);
                assert!((normalized - 1.0).abs() < 1e-3);
                assert!(angle_degrees.unwrap().abs() < 1.0);
            }
            other => panic!("unexpected sample: {:?}", other),
        }
    }

    #[test]
    fn test_vertical_pair_normalizes_to_zero() {
        let frame = frame_with_red_rects(320, 240, &[(100, 20, 30, 30), (100, 180, 30, 30)]);
        match sample_of(&frame) {
            FeatureSample::MarkerAngle { normalized, .. } => {
                assert!(normalized.abs() < 1e-3);
            }
            other => panic!("unexpected sample: {:?}", other),
        }
    }

    #[test]
    fn test_diagonal_pair() {
        // Centroids 120px apart on each axis: 45 degrees, |cos| = sqrt(2)/2
        let frame = frame_with_red_rects(320, 240, &[(40, 40, 30, 30), (160, 160, 30, 30)]);
        match sample_of(&frame) {
            FeatureSample::MarkerAngle { normalized, .. } => {
                assert!((normalized - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-2);
            }
            other => panic!("unexpected sample: {:?}", other),
        }
    }

    /// Red rectangles plus one extra attached pixel, so the rectangle at
    /// `grow` sorts first on area without moving either centroid by more
    /// than a fraction of a pixel
    fn frame_with_grown_rect(rects: &[(u32, u32, u32, u32)], grow: usize) -> Frame {
        let frame = frame_with_red_rects(320, 240, rects);
        let mut data = frame.data.as_ref().clone();
        let (rx, ry, rw, rh) = rects[grow];
        let idx = (((ry + rh / 2) * 320 + rx + rw) * 3) as usize;
        data[idx] = RED_PIXEL.0;
        Frame::new(1, SystemTime::now(), data, 320, 240)
    }

    #[test]
    fn test_order_independence() {
        // Identical rectangles; a one-pixel area difference decides which
        // sorts first, so the pair order flips between the two frames
        let rects = [(30, 30, 30, 30), (200, 150, 30, 30)];
        let a = frame_with_grown_rect(&rects, 0);
        let b = frame_with_grown_rect(&rects, 1);

        let blobs_a = find_marker_blobs(&a, &MarkerConfig::default());
        let blobs_b = find_marker_blobs(&b, &MarkerConfig::default());
        assert_eq!(blobs_a[0].area, 901.0);
        assert_eq!(blobs_b[1].area, 900.0);

        let na = match sample_of(&a) {
            FeatureSample::MarkerAngle { normalized, .. } => normalized,
            other => panic!("unexpected sample: {:?}", other),
        };
        let nb = match sample_of(&b) {
            FeatureSample::MarkerAngle { normalized, .. } => normalized,
            other => panic!("unexpected sample: {:?}", other),
        };

        // The extra pixel shifts a centroid by under 1/900 px, so the
        // normalized angles agree to well within 1e-3
        assert!((na - nb).abs() < 1e-3, "na={} nb={}", na, nb);
    }

    #[test]
    fn test_zero_and_one_blob_emit_zero() {
        let empty = frame_with_red_rects(320, 240, &[]);
        match sample_of(&empty) {
            FeatureSample::MarkerAngle {
                normalized,
                angle_degrees,
                markers,
            } => {
                assert_eq!(normalized, 0.0);
                assert_eq!(angle_degrees, None);
                assert_eq!(markers, 0);
            }
            other => panic!("unexpected sample: {:?}", other),
        }

        let single = frame_with_red_rects(320, 240, &[(50, 50, 30, 30)]);
        match sample_of(&single) {
            FeatureSample::MarkerAngle {
                normalized,
                markers,
                ..
            } => {
                assert_eq!(normalized, 0.0);
                assert_eq!(markers, 1);
            }
            other => panic!("unexpected sample: {:?}", other),
        }
    }

    #[test]
    fn test_area_filter_is_strict() {
        let config = MarkerConfig::default();

        // 20x15 = exactly 300 pixels: excluded
        let at_threshold = frame_with_red_rects(320, 240, &[(50, 50, 20, 15)]);
        assert!(find_marker_blobs(&at_threshold, &config).is_empty());

        // Same rectangle plus one attached pixel = 301: included
        let mut over = frame_with_red_rects(320, 240, &[(50, 50, 20, 15)]);
        {
            let mut data = over.data.as_ref().clone();
            let idx = ((65u32 * 320 + 50) * 3) as usize;
            data[idx] = 255;
            over = Frame::new(1, SystemTime::now(), data, 320, 240);
        }
        let blobs = find_marker_blobs(&over, &config);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 301.0);
    }

    #[test]
    fn test_extra_blobs_are_ignored() {
        // Three qualifying blobs; only the two largest participate
        let frame = frame_with_red_rects(
            320,
            240,
            &[(10, 10, 40, 40), (200, 10, 35, 35), (100, 180, 21, 21)],
        );
        let blobs = find_marker_blobs(&frame, &MarkerConfig::default());
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].area, 1600.0);
        assert_eq!(blobs[1].area, 1225.0);

        match sample_of(&frame) {
            FeatureSample::MarkerAngle { markers, .. } => assert_eq!(markers, 2),
            other => panic!("unexpected sample: {:?}", other),
        }
    }

    #[test]
    fn test_centroid_from_moments() {
        let frame = frame_with_red_rects(320, 240, &[(10, 20, 20, 30)]);
        let mut config = MarkerConfig::default();
        config.min_blob_area = 100.0;
        let blobs = find_marker_blobs(&frame, &config);
        assert_eq!(blobs.len(), 1);
        let (cx, cy) = blobs[0].centroid;
        assert!((cx - 19.5).abs() < 1e-3);
        assert!((cy - 34.5).abs() < 1e-3);
    }

    #[test]
    fn test_insufficient_markers_annotation() {
        let frame = frame_with_red_rects(320, 240, &[]);
        let detection = MarkerAngleDetector::new(MarkerConfig::default()).analyze(&frame);
        assert!(detection.annotations.iter().any(|a| matches!(
            a,
            Annotation::Text { text, .. } if text == "Need exactly 2 markers"
        )));
    }
}
