use crate::camera::{CameraOpener, FrameSource};
use crate::config::{DetectorMode, OscamConfig};
use crate::detect::{FrameAnalyzer, MarkerAngleDetector};
use crate::display::{DisplaySurface, NullDisplay};
use crate::emit::OscEmitter;
use crate::error::Result;
use crate::render::OverlayRenderer;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pipeline lifecycle state, readable by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Loading,
    Running,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunState::Stopped => "Stopped",
            RunState::Loading => "Loading...",
            RunState::Running => "Running",
        };
        f.write_str(text)
    }
}

/// Builds the per-run pipeline pieces. Every start constructs a fresh
/// detector and display; nothing survives between runs.
pub trait PipelineFactory: Send + Sync {
    fn analyzer(&self, dimensions: (u32, u32)) -> Result<Box<dyn FrameAnalyzer>>;
    fn display(&self, dimensions: (u32, u32)) -> Result<Box<dyn DisplaySurface>>;
}

/// Wires the configured detector mode and preview window.
pub struct ConfiguredPipelineFactory {
    config: OscamConfig,
}

impl ConfiguredPipelineFactory {
    pub fn new(config: OscamConfig) -> Self {
        Self { config }
    }
}

impl PipelineFactory for ConfiguredPipelineFactory {
    fn analyzer(&self, _dimensions: (u32, u32)) -> Result<Box<dyn FrameAnalyzer>> {
        match self.config.detector.mode {
            DetectorMode::Marker => Ok(Box::new(MarkerAngleDetector::new(
                self.config.detector.marker.clone(),
            ))),
            DetectorMode::Expression => {
                #[cfg(feature = "facemesh")]
                {
                    use crate::detect::expression::ExpressionDetector;
                    use crate::detect::facemesh::FaceMeshLandmarker;

                    let landmarker = FaceMeshLandmarker::load(&self.config.detector.expression)?;
                    Ok(Box::new(ExpressionDetector::new(
                        Box::new(landmarker),
                        self.config.detector.expression.clone(),
                    )))
                }
                #[cfg(not(feature = "facemesh"))]
                {
                    Err(crate::error::OscamError::system(
                        "Expression mode requires the facemesh feature",
                    ))
                }
            }
        }
    }

    fn display(&self, dimensions: (u32, u32)) -> Result<Box<dyn DisplaySurface>> {
        if !self.config.display.enabled {
            return Ok(Box::new(NullDisplay::new()));
        }

        #[cfg(all(target_os = "linux", feature = "display"))]
        {
            use crate::display::GstDisplay;
            Ok(Box::new(GstDisplay::open(dimensions.0, dimensions.1)?))
        }
        #[cfg(not(all(target_os = "linux", feature = "display")))]
        {
            let _ = dimensions;
            warn!("Preview window not available in this build - running headless");
            Ok(Box::new(NullDisplay::new()))
        }
    }
}

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the run lifecycle: Stopped -> Loading -> Running -> Stopped.
///
/// At most one pipeline runs at a time. Starting while a run is active
/// first stops it completely, so no two camera handles ever overlap. The
/// control surface drives this through `start`, `stop`, and the state
/// watch; it never touches the camera directly.
pub struct StreamController {
    opener: Arc<dyn CameraOpener>,
    factory: Arc<dyn PipelineFactory>,
    emitter: Arc<OscEmitter>,
    renderer: Arc<OverlayRenderer>,
    frame_interval: Duration,
    state_tx: watch::Sender<RunState>,
    state_rx: watch::Receiver<RunState>,
    active: Option<ActiveRun>,
}

impl StreamController {
    pub fn new(
        opener: Arc<dyn CameraOpener>,
        factory: Arc<dyn PipelineFactory>,
        emitter: Arc<OscEmitter>,
        renderer: Arc<OverlayRenderer>,
        frame_interval: Duration,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(RunState::Stopped);
        Self {
            opener,
            factory,
            emitter,
            renderer,
            frame_interval,
            state_tx,
            state_rx,
            active: None,
        }
    }

    /// Wire the controller from configuration with the real camera stack.
    pub fn from_config(config: &OscamConfig) -> Result<Self> {
        let opener: Arc<dyn CameraOpener> = {
            #[cfg(all(target_os = "linux", feature = "camera"))]
            {
                use crate::camera::GstCameraOpener;
                Arc::new(GstCameraOpener::new(config.camera.clone()))
            }
            #[cfg(not(all(target_os = "linux", feature = "camera")))]
            {
                return Err(crate::error::OscamError::system(
                    "Camera support is not built in (enable the camera feature on Linux)",
                ));
            }
        };

        let emitter = Arc::new(OscEmitter::new(&config.osc)?);
        let renderer = Arc::new(OverlayRenderer::new(&config.display));
        let factory = Arc::new(ConfiguredPipelineFactory::new(config.clone()));

        Ok(Self::new(
            opener,
            factory,
            emitter,
            renderer,
            Duration::from_millis(config.system.frame_interval_ms),
        ))
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        *self.state_rx.borrow()
    }

    /// Watch for state transitions (for the control surface status display)
    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state_rx.clone()
    }

    /// Start streaming from the given camera index. Any active run is fully
    /// stopped first. On open failure the state reverts to Stopped and the
    /// error is returned for the control surface to report.
    pub async fn start(&mut self, camera_index: u32) -> Result<()> {
        self.stop().await;

        info!("Starting stream from camera {}", camera_index);
        self.state_tx.send_replace(RunState::Loading);

        let opener = Arc::clone(&self.opener);
        let opened = task::spawn_blocking(move || opener.open(camera_index))
            .await
            .map_err(|e| crate::error::OscamError::system(format!("Open task failed: {}", e)))
            .and_then(|r| r);

        let mut source = match opened {
            Ok(source) => source,
            Err(e) => {
                self.state_tx.send_replace(RunState::Stopped);
                return Err(e);
            }
        };

        let dimensions = source.dimensions();
        let pipeline = self
            .factory
            .analyzer(dimensions)
            .and_then(|analyzer| Ok((analyzer, self.factory.display(dimensions)?)));
        let (analyzer, display) = match pipeline {
            Ok(parts) => parts,
            Err(e) => {
                source.close();
                self.state_tx.send_replace(RunState::Stopped);
                return Err(e);
            }
        };

        self.state_tx.send_replace(RunState::Running);

        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            let state_tx = self.state_tx.clone();
            let emitter = Arc::clone(&self.emitter);
            let renderer = Arc::clone(&self.renderer);
            let frame_interval = self.frame_interval;
            task::spawn_blocking(move || {
                run_frame_loop(
                    source,
                    analyzer,
                    display,
                    renderer,
                    emitter,
                    frame_interval,
                    cancel,
                );
                state_tx.send_replace(RunState::Stopped);
            })
        };

        self.active = Some(ActiveRun { cancel, task });
        Ok(())
    }

    /// Stop the active run, releasing the camera. Safe to call when already
    /// stopped; a second stop is a no-op.
    pub async fn stop(&mut self) {
        if let Some(run) = self.active.take() {
            debug!("Stopping active stream");
            run.cancel.cancel();
            if let Err(e) = run.task.await {
                warn!("Frame loop task did not join cleanly: {}", e);
            }
        }
        self.state_tx.send_replace(RunState::Stopped);
    }
}

/// The per-frame loop: read, detect, render, emit, sleep.
///
/// Cancellation is polled once per iteration; an in-flight frame always
/// finishes its pipeline before a stop takes effect. The camera and display
/// are released exactly once, on the single exit path below the loop.
fn run_frame_loop(
    mut source: Box<dyn FrameSource>,
    mut analyzer: Box<dyn FrameAnalyzer>,
    mut display: Box<dyn DisplaySurface>,
    renderer: Arc<OverlayRenderer>,
    emitter: Arc<OscEmitter>,
    frame_interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            debug!("Frame loop cancelled");
            break;
        }
        if !display.is_open() {
            info!("Preview window closed - stopping stream");
            break;
        }

        let frame = match source.read() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Frame read failed, stopping stream: {}", e);
                break;
            }
        };

        let detection = analyzer.analyze(&frame);

        if let Some(image) = renderer.annotate(&frame, &detection.annotations) {
            if let Err(e) = display.present(&image) {
                warn!("Preview present failed: {}", e);
            }
        }

        for (address, value) in detection.sample.messages() {
            emitter.send(address, value);
        }

        // Yield between iterations so the stream never monopolizes a core
        std::thread::sleep(frame_interval);
    }

    source.close();
    display.close();
    info!("Stream stopped");
}
