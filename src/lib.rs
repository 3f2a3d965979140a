pub mod camera;
pub mod config;
pub mod detect;
pub mod display;
pub mod emit;
pub mod error;
pub mod frame;
pub mod render;
pub mod session;

pub use config::{DetectorMode, OscamConfig};
pub use error::{OscamError, Result};

pub use camera::{CameraOpener, FrameSource};
pub use detect::{
    Annotation, Detection, ExpressionDetector, ExpressionLabel, FeatureSample, FrameAnalyzer,
    MarkerAngleDetector,
};
pub use display::{DisplaySurface, NullDisplay};
pub use emit::OscEmitter;
pub use frame::Frame;
pub use render::OverlayRenderer;
pub use session::{PipelineFactory, RunState, StreamController};
