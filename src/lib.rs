// SPDX-License-Identifier: GPL-3.0-only

//! qrlink - continuous camera QR scanner
//!
//! Frames are pulled from a live camera, decoded, and every newly seen code
//! is posted to a remote endpoint once per contiguous run of sightings.
//!
//! # Architecture
//!
//! - [`backends`]: camera acquisition (GStreamer, image replay) and the frame slot
//! - [`scanner`]: decoder, scan loop, lifecycle state machine, status
//! - [`submit`]: submission wire format and the HTTP submitter
//! - [`receiver`]: reference HTTP receiver
//! - [`config`]: TOML + environment configuration
//! - [`session`]: per-process session identifier

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod receiver;
pub mod scanner;
pub mod session;
pub mod submit;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AccessErrorKind, ConfigError, ScanError, ScanResult};
pub use scanner::{LifecycleController, ScanLoop, ScanState, ScanStatus};
pub use session::SessionId;
