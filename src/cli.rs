// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Scanning continuously with stdin control
//! - Listing available cameras
//! - Decoding a single image
//! - Running the reference receiver

use qrlink::backends::camera::gstreamer::enumerate_cameras;
use qrlink::backends::camera::image_file::{ImageFileBackend, load_image_as_frame};
use qrlink::backends::camera::{CameraBackend, CameraBackendType, get_backend};
use qrlink::scanner::{
    Command, ControllerHandle, ControllerSettings, Decoder, LifecycleController, RqrrDecoder,
    ScanEvent, ScanLoop, StatusReporter, Visibility,
};
use qrlink::submit::HttpSubmitter;
use qrlink::{Config, ConfigError, SessionId};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

/// Flags for `qrlink scan`
#[derive(clap::Args, Debug, Default)]
pub struct ScanOptions {
    /// Base URL of the receiving server
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Camera backend (pipewire or v4l2)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Camera device (from 'qrlink list')
    #[arg(short, long)]
    pub device: Option<String>,

    /// Replay image files instead of opening a camera
    #[arg(short, long = "image")]
    pub images: Vec<PathBuf>,

    /// Accept self-signed certificates from the endpoint
    #[arg(long)]
    pub insecure: bool,

    /// Wait for 'start' on stdin instead of starting right away
    #[arg(long)]
    pub no_autostart: bool,
}

impl ScanOptions {
    fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(name) = &self.backend {
            config.backend = CameraBackendType::parse(name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown backend: {}", name)))?;
        }
        if let Some(device) = &self.device {
            config.device_path = Some(device.clone());
        }
        if self.insecure {
            config.accept_invalid_certs = true;
        }
        config.validate()
    }
}

/// A line typed on stdin while scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StdinCommand {
    Controller(Command),
    Status,
    Help,
}

fn parse_line(line: &str) -> Option<StdinCommand> {
    let command = match line.trim().to_ascii_lowercase().as_str() {
        "start" => StdinCommand::Controller(Command::Start),
        "stop" => StdinCommand::Controller(Command::Stop),
        "hide" | "pause" => StdinCommand::Controller(Command::SetVisibility(Visibility::Hidden)),
        "show" | "resume" => StdinCommand::Controller(Command::SetVisibility(Visibility::Visible)),
        "quit" | "exit" | "q" => StdinCommand::Controller(Command::Shutdown),
        "status" => StdinCommand::Status,
        "help" | "?" => StdinCommand::Help,
        _ => return None,
    };
    Some(command)
}

const HELP: &str = "Commands: start, stop, hide, show, status, quit";

/// Scan until quit or Ctrl+C
pub fn scan(
    config_path: Option<&Path>,
    options: ScanOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(config_path)?;
    options.apply(&mut config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_scanner(config, options))
}

async fn run_scanner(
    config: Config,
    options: ScanOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = SessionId::generate();
    let reporter = StatusReporter::new();

    let backend: Arc<dyn CameraBackend> = if options.images.is_empty() {
        get_backend(config.backend)
    } else {
        Arc::new(ImageFileBackend::new(options.images.clone()))
    };
    let submitter = Arc::new(HttpSubmitter::new(
        &config.endpoint,
        config.request_timeout(),
        config.accept_invalid_certs,
    )?);

    let scan_loop = ScanLoop::new(
        Arc::new(RqrrDecoder::new()),
        submitter,
        session.clone(),
        reporter.clone(),
    )
    .with_frame_interval(config.frame_interval());

    let controller = LifecycleController::new(
        backend,
        scan_loop,
        reporter.clone(),
        ControllerSettings {
            request: config.camera_request(),
            warmup_timeout: config.warmup_timeout(),
        },
    );
    let handle = ControllerHandle::spawn(controller);

    // Ctrl+C performs the same teardown as 'quit'
    let signal_sender = handle.sender();
    ctrlc::set_handler(move || {
        signal_sender.try_send(Command::Shutdown);
    })?;

    let printer = tokio::spawn(print_events(reporter.subscribe_events()));

    println!("Session: {}", session);
    println!("Endpoint: {}", config.endpoint);
    println!("{}", HELP);

    if !options.no_autostart
        && let Err(e) = handle.start().await
    {
        eprintln!("Could not start camera: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        let line = tokio::select! {
            _ = handle.closed() => break,
            line = lines.next_line(), if stdin_open => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => {
                // Keep scanning until Ctrl+C
                stdin_open = false;
                continue;
            }
        };

        match parse_line(&line) {
            Some(StdinCommand::Controller(Command::Shutdown)) => break,
            Some(StdinCommand::Controller(command)) => {
                if let Err(e) = handle.send(command).await {
                    eprintln!("{}", e);
                }
            }
            Some(StdinCommand::Status) => {
                let snapshot = handle.reporter().snapshot();
                println!(
                    "state: {}  status: {}  last: {}",
                    handle.state(),
                    snapshot.status,
                    snapshot.last_value.as_deref().unwrap_or("-")
                );
                if let Some(message) = snapshot.message {
                    println!("  {}", message);
                }
            }
            Some(StdinCommand::Help) => println!("{}", HELP),
            None if line.trim().is_empty() => {}
            None => eprintln!("Unknown command: {}. {}", line.trim(), HELP),
        }
    }

    handle.shutdown().await?;
    printer.abort();
    println!("Stopped.");
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<ScanEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            ScanEvent::StateChanged(state) => println!("[{}]", state),
            ScanEvent::ValueAccepted(value) => println!("Found: {}", value),
            ScanEvent::SubmissionSucceeded { value, .. } => println!("Sent: {}", value),
            ScanEvent::SubmissionFailed { value, reason } => {
                println!("Send failed: {} ({})", value, reason)
            }
            ScanEvent::AccessFailed(kind) => println!("Camera error: {}", kind.user_message()),
            ScanEvent::CapabilityMissing(reason) => println!("Camera unsupported: {}", reason),
            ScanEvent::DecodeFailed(reason) => println!("Scan error: {}", reason),
            ScanEvent::VideoFault(reason) => println!("Video error: {}", reason),
        }
    }
}

/// List all available cameras
pub fn list_cameras(
    config_path: Option<&Path>,
    backend: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = match backend {
        Some(name) => CameraBackendType::parse(name)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown backend: {}", name)))?,
        None => Config::load(config_path)?.backend,
    };

    gstreamer::init()?;
    let cameras = enumerate_cameras(backend);

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", backend);
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.name);
        println!("      Device: {}", camera.path);
        if let Some(location) = &camera.location {
            println!("      Location: {}", location);
        }
    }

    Ok(())
}

/// Decode a QR code from an image file
pub fn decode_image(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let frame = load_image_as_frame(path)?;
    let pixels = frame.packed_rgba();

    match RqrrDecoder::new().decode(&pixels, frame.width, frame.height)? {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => Err(format!("No QR code found in {}", path.display()).into()),
    }
}

/// Run the reference receiver until Ctrl+C
pub fn serve(bind: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        println!("Listening on http://{}", bind);
        qrlink::receiver::serve(bind).await
    })?;
    Ok(())
}
