use crate::config::DisplayConfig;
use crate::detect::Annotation;
use crate::frame::Frame;
use image::RgbImage;
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};
use rusttype::{Font, Scale};
use tracing::warn;

/// Draws detector annotations onto a copy of the frame for the operator
/// preview. Output never travels downstream.
pub struct OverlayRenderer {
    font: Option<Font<'static>>,
    font_size: f32,
}

impl OverlayRenderer {
    /// Build a renderer, loading the overlay font from the configured path.
    /// A missing or unparsable font degrades to shape-only overlays.
    pub fn new(config: &DisplayConfig) -> Self {
        let font = match std::fs::read(&config.font_path) {
            Ok(bytes) => {
                let parsed = Font::try_from_vec(bytes);
                if parsed.is_none() {
                    warn!("Could not parse overlay font '{}'", config.font_path);
                }
                parsed
            }
            Err(e) => {
                warn!(
                    "Could not read overlay font '{}': {} - text overlays disabled",
                    config.font_path, e
                );
                None
            }
        };

        Self {
            font,
            font_size: config.font_size,
        }
    }

    /// Render the annotations over the frame.
    pub fn annotate(&self, frame: &Frame, annotations: &[Annotation]) -> Option<RgbImage> {
        let mut image = frame.to_rgb_image()?;

        for annotation in annotations {
            match annotation {
                Annotation::Disc {
                    center,
                    radius,
                    color,
                } => {
                    draw_filled_circle_mut(
                        &mut image,
                        (center.0.round() as i32, center.1.round() as i32),
                        *radius,
                        *color,
                    );
                }
                Annotation::Segment { from, to, color } => {
                    draw_line_segment_mut(&mut image, *from, *to, *color);
                }
                Annotation::Text {
                    position,
                    text,
                    color,
                } => {
                    if let Some(font) = &self.font {
                        // Text positions are baseline anchors; draw_text_mut
                        // wants the top of the glyph box
                        let top = (position.1 - self.font_size as i32).max(0);
                        draw_text_mut(
                            &mut image,
                            *color,
                            position.0,
                            top,
                            Scale::uniform(self.font_size),
                            font,
                            text,
                        );
                    }
                }
            }
        }

        Some(image)
    }
}
