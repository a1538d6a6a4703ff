// SPDX-License-Identifier: GPL-3.0-only

//! Camera lifecycle state machine
//!
//! ```text
//!            start                 first frame
//!   Idle ───────────► Requesting ─────────────► Running ◄──┐
//!    ▲                    │                      │  │      │ show
//!    │   access error     ▼                 hide │  │ stop │
//!    └────────────────  Error                    ▼  │ fault│
//!                                            Paused─┼──────┘
//!                                                   ▼
//!                                                Stopped ── start ──► Requesting
//! ```
//!
//! The controller exclusively owns the camera handle and the scan state.
//! Commands are applied one at a time; camera faults arrive on a separate
//! channel and always force a stop.

use super::scan_loop::ScanLoop;
use super::status::{ScanEvent, ScanStatus, StatusReporter};
use crate::backends::camera::{BackendError, CameraBackend, CameraHandle, CameraRequest};
use crate::constants::channels::COMMAND_CAPACITY;
use crate::constants::timing::DEFAULT_WARMUP_TIMEOUT;
use crate::errors::{AccessErrorKind, ScanError, ScanResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Scanner lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    #[default]
    Idle,
    Requesting,
    Running,
    Paused,
    Stopped,
    Error,
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Whether whoever watches the camera can currently see it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Commands accepted by a running controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    SetVisibility(Visibility),
    /// Process teardown: release everything and exit
    Shutdown,
}

/// A command plus an optional reply slot
#[derive(Debug)]
pub struct Request {
    command: Command,
    reply: Option<oneshot::Sender<ScanResult<()>>>,
}

/// Controller tuning
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub request: CameraRequest,
    /// How long to wait for the first frame after acquisition
    pub warmup_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            request: CameraRequest::default(),
            warmup_timeout: DEFAULT_WARMUP_TIMEOUT,
        }
    }
}

/// Where the scan loop currently lives
enum ScannerSlot {
    Parked(ScanLoop),
    Active(JoinHandle<ScanLoop>),
}

/// Owns the camera, the scan state and the scan loop
pub struct LifecycleController {
    backend: Arc<dyn CameraBackend>,
    settings: ControllerSettings,
    state: watch::Sender<ScanState>,
    reporter: StatusReporter,
    camera: Option<CameraHandle>,
    scanner: Option<ScannerSlot>,
    spare: ScanLoop,
}

impl LifecycleController {
    /// Create a controller; camera capability is checked immediately
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        scan_loop: ScanLoop,
        reporter: StatusReporter,
        settings: ControllerSettings,
    ) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        let spare = scan_loop.fresh();

        let controller = Self {
            backend,
            settings,
            state,
            reporter,
            camera: None,
            scanner: Some(ScannerSlot::Parked(scan_loop)),
            spare,
        };

        if let Err(err) = controller.check_capability() {
            warn!(error = %err, "Camera capture unavailable, start is disabled");
        }
        controller
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    /// Last accepted decoded value, when the scan loop is parked
    pub fn last_value(&self) -> Option<&str> {
        match &self.scanner {
            Some(ScannerSlot::Parked(scan_loop)) => scan_loop.last_value(),
            _ => None,
        }
    }

    fn transition(&self, next: ScanState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Scan state transition");
            self.reporter.emit(ScanEvent::StateChanged(next));
        }
    }

    fn check_capability(&self) -> ScanResult<()> {
        if self.backend.is_available() {
            return Ok(());
        }
        let err = ScanError::Capability(format!(
            "{} source element not available",
            self.backend.backend_type()
        ));
        self.reporter
            .set_status_with_message(ScanStatus::CapabilityUnsupported, err.to_string());
        self.reporter.emit(ScanEvent::CapabilityMissing(err.to_string()));
        Err(err)
    }

    /// Acquire the camera and begin scanning
    ///
    /// A no-op while a camera is already being requested or held. On
    /// failure the controller is left startable and the error is returned.
    pub async fn start(&mut self) -> ScanResult<()> {
        let current = self.state();
        if matches!(
            current,
            ScanState::Requesting | ScanState::Running | ScanState::Paused
        ) {
            debug!(state = %current, "Start ignored");
            return Ok(());
        }

        self.check_capability()?;

        self.transition(ScanState::Requesting);
        self.reporter.set_status(ScanStatus::Requesting);
        info!(backend = %self.backend.backend_type(), "Requesting camera");

        let backend = Arc::clone(&self.backend);
        let request = self.settings.request.clone();
        let acquired = tokio::task::spawn_blocking(move || backend.acquire(&request))
            .await
            .unwrap_or_else(|e| {
                Err(BackendError::Other(format!(
                    "camera acquisition task failed: {}",
                    e
                )))
            });

        let mut camera = match acquired {
            Ok(camera) => camera,
            Err(e) => return Err(self.fail_start(e.into())),
        };

        // A stream that fails before its first frame fails the start
        let frames = camera.frames();
        let warmup = tokio::select! {
            ready = frames.wait_ready(self.settings.warmup_timeout) => Ok(ready),
            fault = camera.next_fault() => Err(fault),
        };

        match warmup {
            Ok(true) => {}
            Ok(false) => {
                camera.release();
                return Err(self.fail_start(ScanError::Access {
                    kind: AccessErrorKind::Unknown,
                    detail: format!(
                        "no frames within {} ms",
                        self.settings.warmup_timeout.as_millis()
                    ),
                }));
            }
            Err(fault) => {
                warn!(error = %fault, "Camera failed while warming up");
                camera.release();
                return Err(self.fail_start(fault.into()));
            }
        }

        info!(camera = camera.label(), "Camera running");
        self.camera = Some(camera);
        self.spawn_scanner();
        Ok(())
    }

    /// Report a failed start and re-arm
    fn fail_start(&mut self, err: ScanError) -> ScanError {
        let err = match err {
            ScanError::Access { .. } | ScanError::Capability(_) => err,
            other => ScanError::Access {
                kind: AccessErrorKind::Unknown,
                detail: other.to_string(),
            },
        };

        error!(error = %err, "Camera start failed");
        self.transition(ScanState::Error);

        match &err {
            ScanError::Capability(msg) => {
                self.reporter
                    .set_status_with_message(ScanStatus::CapabilityUnsupported, msg.clone());
                self.reporter.emit(ScanEvent::CapabilityMissing(msg.clone()));
            }
            _ => {
                let kind = err.access_kind().unwrap_or(AccessErrorKind::Unknown);
                self.reporter
                    .set_status_with_message(ScanStatus::AccessError, kind.user_message());
                self.reporter.emit(ScanEvent::AccessFailed(kind));
            }
        }

        self.transition(ScanState::Idle);
        err
    }

    /// Enter `Running` and hand the scan loop to its own task
    fn spawn_scanner(&mut self) {
        let Some(camera) = self.camera.as_ref() else {
            return;
        };
        let frames = camera.frames();

        let scan_loop = match self.scanner.take() {
            Some(ScannerSlot::Parked(scan_loop)) => scan_loop,
            Some(active @ ScannerSlot::Active(_)) => {
                self.scanner = Some(active);
                return;
            }
            None => self.spare.fresh(),
        };

        self.transition(ScanState::Running);
        self.reporter.set_status(ScanStatus::Scanning);
        let task = tokio::spawn(scan_loop.run(frames, self.state.subscribe()));
        self.scanner = Some(ScannerSlot::Active(task));
    }

    /// Wait for the scan task to notice it is no longer running and take it back
    async fn park_scanner(&mut self) {
        if let Some(ScannerSlot::Active(task)) = self.scanner.take() {
            let scan_loop = match task.await {
                Ok(scan_loop) => scan_loop,
                Err(e) => {
                    error!(error = %e, "Scan loop task failed, continuing with a fresh one");
                    self.spare.fresh()
                }
            };
            self.scanner = Some(ScannerSlot::Parked(scan_loop));
        }
    }

    /// Leave the live states: halt sampling, then release the camera
    async fn halt(&mut self, next: ScanState) {
        self.transition(next);
        self.park_scanner().await;
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
    }

    /// Stop scanning and release the camera; a no-op unless live
    pub async fn stop(&mut self) {
        let current = self.state();
        if !matches!(current, ScanState::Running | ScanState::Paused) {
            debug!(state = %current, "Stop ignored");
            return;
        }
        info!("Stopping scanner");
        self.halt(ScanState::Stopped).await;
        self.reporter.set_status(ScanStatus::Stopped);
    }

    /// Pause on hide, resume on show; the camera stays acquired throughout
    pub async fn set_visibility(&mut self, visibility: Visibility) {
        match (visibility, self.state()) {
            (Visibility::Hidden, ScanState::Running) => {
                info!("Hidden, pausing scanner");
                self.transition(ScanState::Paused);
                self.park_scanner().await;
                self.reporter.set_status(ScanStatus::Paused);
            }
            (Visibility::Visible, ScanState::Paused) if self.camera.is_some() => {
                info!("Visible again, resuming scanner");
                self.spawn_scanner();
            }
            (visibility, state) => {
                debug!(?visibility, %state, "Visibility change ignored");
            }
        }
    }

    /// Force a stop after the camera stream failed
    pub async fn handle_video_fault(&mut self, reason: String) {
        let current = self.state();
        if !matches!(current, ScanState::Running | ScanState::Paused) {
            debug!(state = %current, %reason, "Late camera fault ignored");
            return;
        }

        let err = ScanError::Video(reason.clone());
        error!(error = %err, "Camera stream failed, stopping");
        self.halt(ScanState::Stopped).await;
        self.reporter
            .set_status_with_message(ScanStatus::VideoError, err.to_string());
        self.reporter.emit(ScanEvent::VideoFault(reason));
    }

    /// Release everything regardless of the current state
    pub async fn shutdown(&mut self) {
        info!(state = %self.state(), "Shutting down scanner");
        let was_live = self.camera.is_some()
            || matches!(
                self.state(),
                ScanState::Requesting | ScanState::Running | ScanState::Paused
            );
        self.halt(ScanState::Stopped).await;
        if was_live {
            self.reporter.set_status(ScanStatus::Stopped);
        }
    }

    async fn apply(&mut self, command: Command) -> ScanResult<()> {
        match command {
            Command::Start => self.start().await?,
            Command::Stop => self.stop().await,
            Command::SetVisibility(visibility) => self.set_visibility(visibility).await,
            Command::Shutdown => self.shutdown().await,
        }
        Ok(())
    }

    /// Process commands and camera faults until shutdown
    ///
    /// Returns the controller (camera already released) when done.
    pub async fn run(mut self, mut requests: mpsc::Receiver<Request>) -> Self {
        enum Wake {
            Request(Option<Request>),
            Fault(BackendError),
        }

        loop {
            let wake = tokio::select! {
                request = requests.recv() => Wake::Request(request),
                reason = next_fault(&mut self.camera) => Wake::Fault(reason),
            };

            match wake {
                Wake::Fault(fault) => self.handle_video_fault(fault.detail().to_string()).await,
                Wake::Request(None) => {
                    self.shutdown().await;
                    break;
                }
                Wake::Request(Some(Request { command, reply })) => {
                    let result = self.apply(command).await;
                    if let Err(err) = &result {
                        warn!(?command, error = %err, "Command failed");
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                    if command == Command::Shutdown {
                        break;
                    }
                }
            }
        }

        self
    }
}

async fn next_fault(camera: &mut Option<CameraHandle>) -> BackendError {
    match camera {
        Some(camera) => camera.next_fault().await,
        None => std::future::pending().await,
    }
}

/// Cloneable, non-async command sender (for signal handlers)
#[derive(Debug, Clone)]
pub struct CommandSender {
    requests: mpsc::Sender<Request>,
}

impl CommandSender {
    /// Queue a command without waiting; `false` when it could not be queued
    pub fn try_send(&self, command: Command) -> bool {
        self.requests
            .try_send(Request {
                command,
                reply: None,
            })
            .is_ok()
    }
}

/// Handle to a controller running on its own task
pub struct ControllerHandle {
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<ScanState>,
    reporter: StatusReporter,
    task: JoinHandle<LifecycleController>,
}

impl ControllerHandle {
    /// Move a controller onto its own task
    pub fn spawn(controller: LifecycleController) -> Self {
        let (requests, rx) = mpsc::channel(COMMAND_CAPACITY);
        let state = controller.subscribe_state();
        let reporter = controller.reporter().clone();
        let task = tokio::spawn(controller.run(rx));
        Self {
            requests,
            state,
            reporter,
            task,
        }
    }

    /// Send a command and wait until it has been applied
    pub async fn send(&self, command: Command) -> ScanResult<()> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| ScanError::ControllerClosed)?;
        response.await.map_err(|_| ScanError::ControllerClosed)?
    }

    pub async fn start(&self) -> ScanResult<()> {
        self.send(Command::Start).await
    }

    pub async fn stop(&self) -> ScanResult<()> {
        self.send(Command::Stop).await
    }

    pub async fn set_visibility(&self, visibility: Visibility) -> ScanResult<()> {
        self.send(Command::SetVisibility(visibility)).await
    }

    /// Resolves once the controller task has exited
    pub async fn closed(&self) {
        self.requests.closed().await
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            requests: self.requests.clone(),
        }
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ScanState> {
        self.state.clone()
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    /// Tear down and wait for the controller task to finish
    pub async fn shutdown(self) -> ScanResult<LifecycleController> {
        // The task may already have exited on a signal-driven shutdown
        let _ = self.send(Command::Shutdown).await;
        drop(self.requests);
        self.task.await.map_err(|_| ScanError::ControllerClosed)
    }

    /// Wait for the controller task to exit on its own (e.g. after Ctrl+C)
    pub async fn join(self) -> ScanResult<LifecycleController> {
        drop(self.requests);
        self.task.await.map_err(|_| ScanError::ControllerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(ScanState::Running.to_string(), "running");
        assert_eq!(
            serde_json::to_string(&ScanState::Paused).unwrap(),
            "\"paused\""
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = ControllerSettings::default();
        assert_eq!(settings.request.ideal_width, 1280);
        assert_eq!(settings.request.ideal_height, 720);
        assert_eq!(settings.warmup_timeout, DEFAULT_WARMUP_TIMEOUT);
    }
}
