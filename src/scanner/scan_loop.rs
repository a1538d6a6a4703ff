// SPDX-License-Identifier: GPL-3.0-only

//! Frame sampling, decoding and dedup
//!
//! One cycle: read the newest frame, decode it off the async threads, and
//! hand any new value to the submitter without waiting for the outcome.
//!
//! ```text
//!   tick ──► current_frame ──► decode ──► Dedup ──► dispatch (detached)
//!              │ not ready        │ none     │ same
//!              └──── skip ────────┴─────────┴──► next tick
//! ```

use super::decoder::Decoder;
use super::lifecycle::ScanState;
use super::status::{ScanEvent, ScanStatus, StatusReporter};
use crate::backends::camera::FrameSource;
use crate::constants::timing::{
    DEFAULT_FRAME_INTERVAL, FRAME_LOG_INTERVAL, MIN_FRAME_INTERVAL,
};
use crate::errors::ScanError;
use crate::session::SessionId;
use crate::submit::{Submission, Submitter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Last accepted decoded value
///
/// A value is accepted when it differs from the previous accepted one, so a
/// run of identical decodes yields one acceptance and a value that comes
/// back after a different one is accepted again.
#[derive(Debug, Default, Clone)]
pub struct Dedup {
    last: Option<String>,
}

impl Dedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the value when it is new
    pub fn accept(&mut self, value: &str) -> bool {
        if self.last.as_deref() == Some(value) {
            return false;
        }
        self.last = Some(value.to_string());
        true
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// What a single cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No frame with real dimensions yet
    NotReady,
    NoCode,
    /// Same value as the last accepted one
    Duplicate,
    /// New value, submission dispatched
    Submitted(String),
    DecodeFailed,
}

/// Owned scanning state, run as a single task while the camera is live
pub struct ScanLoop {
    decoder: Arc<dyn Decoder>,
    submitter: Arc<dyn Submitter>,
    session: SessionId,
    reporter: StatusReporter,
    dedup: Dedup,
    frame_interval: Duration,
    cycles: u64,
}

impl ScanLoop {
    pub fn new(
        decoder: Arc<dyn Decoder>,
        submitter: Arc<dyn Submitter>,
        session: SessionId,
        reporter: StatusReporter,
    ) -> Self {
        Self {
            decoder,
            submitter,
            session,
            reporter,
            dedup: Dedup::new(),
            frame_interval: DEFAULT_FRAME_INTERVAL,
            cycles: 0,
        }
    }

    /// Gap between cycles; clamped to [`MIN_FRAME_INTERVAL`]
    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval.max(MIN_FRAME_INTERVAL);
        self
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Same collaborators, empty dedup state
    pub fn fresh(&self) -> Self {
        Self::new(
            Arc::clone(&self.decoder),
            Arc::clone(&self.submitter),
            self.session.clone(),
            self.reporter.clone(),
        )
        .with_frame_interval(self.frame_interval)
    }

    /// Last accepted decoded value
    pub fn last_value(&self) -> Option<&str> {
        self.dedup.last()
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Run one sample/decode/dedup cycle
    ///
    /// Never fails: decode problems are reported and the caller simply
    /// schedules the next cycle.
    pub async fn cycle(&mut self, frames: &FrameSource) -> CycleOutcome {
        self.cycles += 1;

        let Some(frame) = frames.current_frame() else {
            if self.cycles % FRAME_LOG_INTERVAL == 0 {
                trace!(cycle = self.cycles, "No frame ready yet");
            }
            return CycleOutcome::NotReady;
        };

        let decoder = Arc::clone(&self.decoder);
        let decoded = tokio::task::spawn_blocking(move || {
            let pixels = frame.packed_rgba();
            decoder.decode(&pixels, frame.width, frame.height)
        })
        .await
        .unwrap_or_else(|e| Err(ScanError::Decode(format!("decoder task failed: {}", e))));

        match decoded {
            Err(err) => {
                warn!(error = %err, "Frame decode failed");
                self.reporter
                    .set_status_with_message(ScanStatus::DecodeError, err.to_string());
                self.reporter.emit(ScanEvent::DecodeFailed(err.to_string()));
                CycleOutcome::DecodeFailed
            }
            Ok(None) => {
                self.reporter.set_status(ScanStatus::Scanning);
                CycleOutcome::NoCode
            }
            Ok(Some(value)) if !self.dedup.accept(&value) => {
                self.reporter.set_status(ScanStatus::Scanning);
                CycleOutcome::Duplicate
            }
            Ok(Some(value)) => {
                info!(value = %value, "New code detected");
                self.reporter.set_last_value(&value);
                self.reporter.set_status(ScanStatus::MatchFound);
                self.reporter.emit(ScanEvent::ValueAccepted(value.clone()));
                self.dispatch(value.clone());
                CycleOutcome::Submitted(value)
            }
        }
    }

    /// Submit on a detached task; outcomes only ever reach the reporter
    fn dispatch(&self, value: String) {
        let submission = Submission::new(self.session.clone(), value.clone());
        let pending = self.submitter.submit(submission);
        let reporter = self.reporter.clone();

        tokio::spawn(async move {
            match pending.await {
                Ok(body) => {
                    info!(value = %value, "Submission accepted");
                    debug!(response = %body, "Server response");
                    reporter.emit(ScanEvent::SubmissionSucceeded { value, body });
                }
                Err(e) => {
                    let err = ScanError::from(e);
                    warn!(value = %value, error = %err, "Submission failed");
                    // Only while scanning; a stop or pause since dispatch keeps its status
                    reporter.set_status_from(
                        &[ScanStatus::Scanning, ScanStatus::MatchFound],
                        ScanStatus::SubmissionError,
                        err.to_string(),
                    );
                    reporter.emit(ScanEvent::SubmissionFailed {
                        value,
                        reason: err.to_string(),
                    });
                }
            }
        });
    }

    /// Cycle on the frame interval for as long as the state stays `Running`
    ///
    /// Returns itself on exit so the owner keeps the dedup state across a
    /// pause.
    pub async fn run(mut self, frames: FrameSource, mut state: watch::Receiver<ScanState>) -> Self {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.frame_interval.as_millis(), "Scan loop started");

        loop {
            if *state.borrow_and_update() != ScanState::Running {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if *state.borrow() != ScanState::Running {
                break;
            }
            self.cycle(&frames).await;
        }

        info!(cycles = self.cycles, "Scan loop stopped");
        self
    }
}
