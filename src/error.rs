use thiserror::Error;

/// Camera acquisition errors
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Could not open camera {index}: {details}")]
    DeviceOpen { index: u32, details: String },

    #[error("Frame read failed: {details}")]
    ReadFailure { details: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },
}

/// Feature detector errors
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Landmark model error: {details}")]
    LandmarkModel { details: String },

    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },
}

/// Preview display errors
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Display pipeline error: {details}")]
    Pipeline { details: String },

    #[error("Overlay rendering failed: {details}")]
    Overlay { details: String },
}

/// OSC emitter errors. These only surface during setup; per-message send
/// failures are swallowed inside the emitter.
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("Invalid OSC endpoint '{endpoint}': {details}")]
    Endpoint { endpoint: String, details: String },

    #[error("Socket setup failed: {details}")]
    Socket { details: String },
}

#[derive(Error, Debug)]
pub enum OscamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    #[error("Emitter error: {0}")]
    Emit(#[from] EmitError),

    #[error("System error: {message}")]
    System { message: String },
}

impl OscamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OscamError>;
