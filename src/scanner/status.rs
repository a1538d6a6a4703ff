// SPDX-License-Identifier: GPL-3.0-only

//! Observable scanner status and events
//!
//! Two views are published: a snapshot (`watch`) holding the current status,
//! the last accepted value and a message, and a stream of discrete events
//! (`broadcast`). Neither feeds back into the scanner.

use super::lifecycle::ScanState;
use crate::constants::channels::EVENT_CAPACITY;
use crate::errors::AccessErrorKind;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

/// Status value exposed to whatever presents the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScanStatus {
    #[default]
    Idle,
    CapabilityUnsupported,
    Requesting,
    Scanning,
    MatchFound,
    Paused,
    Stopped,
    AccessError,
    VideoError,
    DecodeError,
    SubmissionError,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CapabilityUnsupported => "capability-unsupported",
            Self::Requesting => "requesting",
            Self::Scanning => "scanning",
            Self::MatchFound => "match-found",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::AccessError => "access-error",
            Self::VideoError => "video-error",
            Self::DecodeError => "decode-error",
            Self::SubmissionError => "submission-error",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: ScanStatus,
    /// Most recently accepted decoded value
    pub last_value: Option<String>,
    /// Human-readable detail for the current status
    pub message: Option<String>,
}

/// Discrete things that happened
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    StateChanged(ScanState),
    /// A new value passed dedup and is being submitted
    ValueAccepted(String),
    SubmissionSucceeded {
        value: String,
        body: serde_json::Value,
    },
    SubmissionFailed {
        value: String,
        reason: String,
    },
    AccessFailed(AccessErrorKind),
    CapabilityMissing(String),
    DecodeFailed(String),
    VideoFault(String),
}

/// Publishes status and events; cheap to clone
#[derive(Debug, Clone)]
pub struct StatusReporter {
    snapshot: watch::Sender<StatusSnapshot>,
    events: broadcast::Sender<ScanEvent>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(StatusSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { snapshot, events }
    }

    /// Set the status, clearing any previous message
    ///
    /// Watchers are only woken when something actually changed, so the scan
    /// loop can report `scanning` every cycle.
    pub fn set_status(&self, status: ScanStatus) {
        self.snapshot.send_if_modified(|snap| {
            let changed = snap.status != status || snap.message.is_some();
            snap.status = status;
            snap.message = None;
            changed
        });
    }

    /// Set the status together with a human-readable message
    pub fn set_status_with_message(&self, status: ScanStatus, message: impl Into<String>) {
        let message = message.into();
        self.snapshot.send_modify(|snap| {
            snap.status = status;
            snap.message = Some(message);
        });
    }

    /// Set status and message only while the current status is one of `from`
    ///
    /// Returns whether the snapshot changed.
    pub fn set_status_from(
        &self,
        from: &[ScanStatus],
        status: ScanStatus,
        message: impl Into<String>,
    ) -> bool {
        let message = message.into();
        self.snapshot.send_if_modified(|snap| {
            if !from.contains(&snap.status) {
                return false;
            }
            snap.status = status;
            snap.message = Some(message);
            true
        })
    }

    /// Record a newly accepted value
    pub fn set_last_value(&self, value: &str) {
        self.snapshot
            .send_modify(|snap| snap.last_value = Some(value.to_string()));
    }

    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: ScanEvent) {
        let _ = self.events.send(event);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> ScanStatus {
        self.snapshot.borrow().status
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }
}
