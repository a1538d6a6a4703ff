// SPDX-License-Identifier: GPL-3.0-only

//! Hardware access layer
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Scanner                      │
//! └────────────────────┬────────────────────────┘
//!                      │ CameraBackend::acquire
//! ┌────────────────────┴────────────────────────┐
//! │  Camera: GStreamer (PipeWire / V4L2)         │
//! │          Image replay                        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod camera;
