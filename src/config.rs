use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OscamConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub osc: OscConfig,
    pub display: DisplayConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0), selectable 0-9
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second requested from the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

/// Which feature detector drives the stream. Each run uses exactly one.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectorMode {
    /// Track two red stickers and stream the normalized pair angle
    Marker,
    /// Track mouth landmarks and stream a smile intensity
    Expression,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_mode")]
    pub mode: DetectorMode,

    pub marker: MarkerConfig,
    pub expression: ExpressionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MarkerConfig {
    /// Minimum blob area in pixels; blobs at or below this are discarded
    #[serde(default = "default_min_blob_area")]
    pub min_blob_area: f32,

    /// Upper bound of the low red hue band (OpenCV-style hue, 0-180)
    #[serde(default = "default_hue_low_max")]
    pub hue_low_max: u8,

    /// Lower bound of the high red hue band (wrap-around side)
    #[serde(default = "default_hue_high_min")]
    pub hue_high_min: u8,

    /// Minimum saturation for the red mask (0-255)
    #[serde(default = "default_saturation_min")]
    pub saturation_min: u8,

    /// Minimum value for the red mask (0-255)
    #[serde(default = "default_value_min")]
    pub value_min: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExpressionConfig {
    /// Path to the face mesh ONNX model
    #[serde(default = "default_facemesh_model_path")]
    pub model_path: String,

    /// Corner lift above this many pixels reads as a smile
    #[serde(default = "default_smile_threshold")]
    pub smile_threshold_px: f32,

    /// Corner lift below negative this many pixels reads as a frown
    #[serde(default = "default_frown_threshold")]
    pub frown_threshold_px: f32,

    /// Minimum face presence score from the landmark model
    #[serde(default = "default_face_score_min")]
    pub face_score_min: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OscConfig {
    /// Receiver host
    #[serde(default = "default_osc_host")]
    pub host: String,

    /// Receiver port
    #[serde(default = "default_osc_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplayConfig {
    /// Show the annotated preview window
    #[serde(default = "default_display_enabled")]
    pub enabled: bool,

    /// Path to a TrueType font for overlay text
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Font size for overlay text
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Delay between frame loop iterations in milliseconds
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

fn default_camera_index() -> u32 {
    0
}

fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}

fn default_camera_fps() -> u32 {
    30
}

fn default_detector_mode() -> DetectorMode {
    DetectorMode::Marker
}

fn default_min_blob_area() -> f32 {
    300.0
}

fn default_hue_low_max() -> u8 {
    10
}

fn default_hue_high_min() -> u8 {
    170
}

fn default_saturation_min() -> u8 {
    150
}

fn default_value_min() -> u8 {
    150
}

fn default_facemesh_model_path() -> String {
    "models/face_landmark.onnx".to_string()
}

fn default_smile_threshold() -> f32 {
    5.0
}

fn default_frown_threshold() -> f32 {
    3.0
}

fn default_face_score_min() -> f32 {
    0.5
}

fn default_osc_host() -> String {
    "127.0.0.1".to_string()
}

fn default_osc_port() -> u16 {
    4567
}

fn default_display_enabled() -> bool {
    true
}

fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}

fn default_font_size() -> f32 {
    24.0
}

fn default_frame_interval_ms() -> u64 {
    10
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: default_camera_index(),
            resolution: default_camera_resolution(),
            fps: default_camera_fps(),
        }
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            min_blob_area: default_min_blob_area(),
            hue_low_max: default_hue_low_max(),
            hue_high_min: default_hue_high_min(),
            saturation_min: default_saturation_min(),
            value_min: default_value_min(),
        }
    }
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            model_path: default_facemesh_model_path(),
            smile_threshold_px: default_smile_threshold(),
            frown_threshold_px: default_frown_threshold(),
            face_score_min: default_face_score_min(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            mode: default_detector_mode(),
            marker: MarkerConfig::default(),
            expression: ExpressionConfig::default(),
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: default_osc_host(),
            port: default_osc_port(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: default_display_enabled(),
            font_path: default_font_path(),
            font_size: default_font_size(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl Default for OscamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            detector: DetectorConfig::default(),
            osc: OscConfig::default(),
            display: DisplayConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl OscamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("oscam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let defaults = toml::to_string(&OscamConfig::default())
            .map_err(|e| ConfigError::Message(format!("Default serialization failed: {}", e)))?;

        let settings = Config::builder()
            // Start with default values
            .add_source(File::from_str(&defaults, config::FileFormat::Toml))
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with OSCAM_ prefix
            .add_source(Environment::with_prefix("OSCAM").separator("__"))
            .build()?;

        let config: OscamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.index > 9 {
            return Err(ConfigError::Message(format!(
                "Camera index {} out of range (selector covers 0-9)",
                self.camera.index
            )));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be non-zero".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than zero".to_string(),
            ));
        }

        if self.detector.marker.min_blob_area < 0.0 {
            return Err(ConfigError::Message(
                "Marker minimum blob area must be non-negative".to_string(),
            ));
        }

        if self.detector.marker.hue_low_max >= self.detector.marker.hue_high_min {
            return Err(ConfigError::Message(
                "Red hue bands must not overlap (hue_low_max < hue_high_min)".to_string(),
            ));
        }

        if self.detector.expression.smile_threshold_px <= 0.0
            || self.detector.expression.frown_threshold_px <= 0.0
        {
            return Err(ConfigError::Message(
                "Expression thresholds must be positive".to_string(),
            ));
        }

        if self.osc.port == 0 {
            return Err(ConfigError::Message(
                "OSC port must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Default configuration rendered as TOML, for --print-config
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&OscamConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_tracker_constants() {
        let config = OscamConfig::default();

        assert_eq!(config.camera.index, 0);
        assert_eq!(config.camera.resolution, (640, 480));
        assert_eq!(config.detector.mode, DetectorMode::Marker);
        assert_eq!(config.detector.marker.min_blob_area, 300.0);
        assert_eq!(config.detector.marker.hue_low_max, 10);
        assert_eq!(config.detector.marker.hue_high_min, 170);
        assert_eq!(config.detector.marker.saturation_min, 150);
        assert_eq!(config.detector.marker.value_min, 150);
        assert_eq!(config.detector.expression.smile_threshold_px, 5.0);
        assert_eq!(config.detector.expression.frown_threshold_px, 3.0);
        assert_eq!(config.osc.host, "127.0.0.1");
        assert_eq!(config.osc.port, 4567);
        assert_eq!(config.system.frame_interval_ms, 10);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(OscamConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = OscamConfig::default();
        config.camera.index = 10;
        assert!(config.validate().is_err());

        let mut config = OscamConfig::default();
        config.osc.port = 0;
        assert!(config.validate().is_err());

        let mut config = OscamConfig::default();
        config.detector.expression.smile_threshold_px = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = OscamConfig::load_from_file("/nonexistent/oscam.toml").unwrap();
        assert_eq!(config.osc.port, 4567);
        assert_eq!(config.detector.mode, DetectorMode::Marker);
    }

    #[test]
    fn test_load_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[detector]\nmode = \"expression\"\n\n[osc]\nport = 9000"
        )
        .unwrap();

        let config = OscamConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.detector.mode, DetectorMode::Expression);
        assert_eq!(config.osc.port, 9000);
        // Untouched sections keep their defaults
        assert_eq!(config.detector.marker.min_blob_area, 300.0);
    }

    #[test]
    fn test_default_toml_round_trips() {
        let rendered = OscamConfig::default_toml().unwrap();
        let parsed: OscamConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.osc.port, OscamConfig::default().osc.port);
    }
}
