// SPDX-License-Identifier: GPL-3.0-only

//! Continuous QR scanning
//!
//! - [`decoder`]: pixel buffer to optional string
//! - [`scan_loop`]: per-frame sampling with dedup and detached submission
//! - [`lifecycle`]: camera ownership and the scan state machine
//! - [`status`]: observable status snapshot and event stream

pub mod decoder;
pub mod lifecycle;
pub mod scan_loop;
pub mod status;

pub use decoder::{Decoder, RqrrDecoder};
pub use lifecycle::{
    Command, CommandSender, ControllerHandle, ControllerSettings, LifecycleController, ScanState,
    Visibility,
};
pub use scan_loop::{CycleOutcome, Dedup, ScanLoop};
pub use status::{ScanEvent, ScanStatus, StatusReporter, StatusSnapshot};
