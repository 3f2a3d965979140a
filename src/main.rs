use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use oscam::session::StreamController;
use oscam::{DetectorMode, OscamConfig, RunState};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "oscam")]
#[command(about = "Webcam feature tracker streaming scalar control values over OSC")]
#[command(version)]
#[command(long_about = "Tracks either a pair of red stickers (streaming the normalized angle \
between them) or facial mouth landmarks (streaming a smile intensity) from a webcam, and sends \
the per-frame values over OSC/UDP to a downstream performance engine.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "oscam.toml")]
    config: String,

    /// Detector mode override: marker or expression
    #[arg(short, long, value_name = "MODE")]
    mode: Option<String>,

    /// Camera index override (0-9)
    #[arg(long, value_name = "INDEX")]
    camera: Option<u32>,

    /// Start streaming immediately instead of waiting for a key
    #[arg(long)]
    start: bool,

    /// Run without the preview window
    #[arg(long)]
    headless: bool,

    /// Enable debug level logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose info level logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Validate configuration file and exit
    #[arg(long)]
    validate_config: bool,

    /// Print default configuration in TOML format and exit
    #[arg(long)]
    print_config: bool,
}

/// Commands from the operator key loop
#[derive(Debug)]
enum ControlCommand {
    SelectCamera(u32),
    Start,
    Stop,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", OscamConfig::default_toml()?);
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting oscam v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match OscamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    apply_overrides(&mut config, &args)?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let mut controller = StreamController::from_config(&config)?;
    let mut selected_camera = config.camera.index;

    let (command_tx, mut command_rx) = mpsc::channel::<ControlCommand>(16);
    let cancel = CancellationToken::new();
    let key_task = spawn_key_loop(command_tx.clone(), cancel.clone());

    // Mirror state transitions to the operator terminal
    let mut state_rx = controller.watch_state();

    println!(
        "oscam ready - camera {} | digits: select camera, s: start, x/Esc: stop, q: quit",
        selected_camera
    );

    if args.start {
        start_stream(&mut controller, selected_camera).await;
    }

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                match command {
                    Some(ControlCommand::SelectCamera(index)) => {
                        if controller.state() == RunState::Stopped {
                            selected_camera = index;
                            println!("\rCamera {} selected", index);
                        } else {
                            println!("\rStop the stream before changing cameras");
                        }
                    }
                    Some(ControlCommand::Start) => {
                        start_stream(&mut controller, selected_camera).await;
                    }
                    Some(ControlCommand::Stop) => {
                        controller.stop().await;
                    }
                    Some(ControlCommand::Quit) | None => {
                        break;
                    }
                }
            }
            changed = state_rx.changed() => {
                if changed.is_ok() {
                    println!("\rStatus: {}", *state_rx.borrow());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C)");
                break;
            }
        }
    }

    controller.stop().await;
    cancel.cancel();
    let _ = key_task.await;

    info!("oscam shutdown complete");
    Ok(())
}

async fn start_stream(controller: &mut StreamController, camera_index: u32) {
    if let Err(e) = controller.start(camera_index).await {
        error!("Could not start stream: {}", e);
        println!("\rError: {}", e);
    }
}

fn apply_overrides(config: &mut OscamConfig, args: &Args) -> Result<()> {
    if let Some(mode) = &args.mode {
        config.detector.mode = match mode.as_str() {
            "marker" => DetectorMode::Marker,
            "expression" => DetectorMode::Expression,
            other => anyhow::bail!("Unknown detector mode '{}' (marker|expression)", other),
        };
    }
    if let Some(index) = args.camera {
        config.camera.index = index;
    }
    if args.headless {
        config.display.enabled = false;
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let default_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("oscam={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Key loop on a blocking task: raw mode, polled with a timeout so the
/// cancellation token is honored promptly.
fn spawn_key_loop(
    command_tx: mpsc::Sender<ControlCommand>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = enable_raw_mode() {
            warn!("Could not enable raw keyboard mode: {}", e);
            return;
        }

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {
                    if let Ok(Event::Key(key)) = event::read() {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        let command = match key.code {
                            KeyCode::Char(c @ '0'..='9') => {
                                Some(ControlCommand::SelectCamera(c as u32 - '0' as u32))
                            }
                            KeyCode::Char('s') => Some(ControlCommand::Start),
                            // Escape stops the stream, matching the preview
                            // window's close control
                            KeyCode::Char('x') | KeyCode::Esc => Some(ControlCommand::Stop),
                            KeyCode::Char('q') => Some(ControlCommand::Quit),
                            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                                Some(ControlCommand::Quit)
                            }
                            _ => None,
                        };
                        if let Some(command) = command {
                            let quit = matches!(command, ControlCommand::Quit);
                            if command_tx.blocking_send(command).is_err() || quit {
                                break;
                            }
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Keyboard poll failed: {}", e);
                    break;
                }
            }
        }

        if let Err(e) = disable_raw_mode() {
            warn!("Could not disable raw keyboard mode: {}", e);
        }
    })
}
