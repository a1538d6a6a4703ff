// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the scanner
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ ScanError                                                    │
//! │  Capability  camera API missing        → start rejected       │
//! │  Access      denied / missing / busy   → start rejected       │
//! │  Decode      per-frame failure         → status, loop goes on │
//! │  Video       stream fault while live   → forced stop          │
//! │  Submission  remote delivery failed    → status, no retry     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::backends::camera::BackendError;
use crate::submit::SubmitError;
use thiserror::Error;

/// Result type alias using ScanError
pub type ScanResult<T> = Result<T, ScanError>;

/// Reason a camera could not be acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessErrorKind {
    /// The user or system policy refused camera access
    PermissionDenied,
    /// No matching camera device exists
    DeviceNotFound,
    /// The camera is held by another application
    DeviceBusy,
    /// Anything else
    Unknown,
}

impl AccessErrorKind {
    /// Stable identifier exposed to observers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission-denied",
            Self::DeviceNotFound => "device-not-found",
            Self::DeviceBusy => "device-busy",
            Self::Unknown => "unknown",
        }
    }

    /// Message suitable for showing to the person holding the camera
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Camera access was denied. Allow camera access and try again.",
            Self::DeviceNotFound => "No camera was found.",
            Self::DeviceBusy => "The camera is already in use by another application.",
            Self::Unknown => "The camera could not be started.",
        }
    }
}

impl std::fmt::Display for AccessErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main scanner error type
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// Camera capture is not supported in this environment
    #[error("Camera capture is not supported: {0}")]
    Capability(String),

    /// Camera access failed while starting
    #[error("Camera access failed ({kind}): {detail}")]
    Access { kind: AccessErrorKind, detail: String },

    /// A single frame could not be captured or decoded
    #[error("Frame decode failed: {0}")]
    Decode(String),

    /// The live video stream reported a fault
    #[error("Video stream error: {0}")]
    Video(String),

    /// A decoded value could not be delivered
    #[error(transparent)]
    Submission(#[from] SubmitError),

    /// The lifecycle controller task has exited
    #[error("Scanner controller is no longer running")]
    ControllerClosed,
}

impl ScanError {
    /// Access error kind, if this is an access failure
    pub fn access_kind(&self) -> Option<AccessErrorKind> {
        match self {
            Self::Access { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<BackendError> for ScanError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotAvailable(msg) => ScanError::Capability(msg),
            BackendError::PermissionDenied(detail) => ScanError::Access {
                kind: AccessErrorKind::PermissionDenied,
                detail,
            },
            BackendError::DeviceNotFound(detail) => ScanError::Access {
                kind: AccessErrorKind::DeviceNotFound,
                detail,
            },
            BackendError::DeviceBusy(detail) => ScanError::Access {
                kind: AccessErrorKind::DeviceBusy,
                detail,
            },
            BackendError::InitializationFailed(detail) | BackendError::Other(detail) => {
                ScanError::Access {
                    kind: AccessErrorKind::Unknown,
                    detail,
                }
            }
            BackendError::Stream(detail) => ScanError::Video(detail),
        }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or malformed
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
