// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ LifecycleController  │  ← owns the CameraHandle
//! └──────────┬───────────┘
//!            │ acquire()
//!            ▼
//! ┌──────────────────────┐
//! │  CameraBackend Trait │  ← capability check + acquisition
//! └──────────┬───────────┘
//!            │
//!      ┌─────┴──────┬───────────────┐
//!      ▼            ▼               ▼
//!  ┌────────┐  ┌────────┐   ┌──────────────┐
//!  │PipeWire│  │  V4L2  │   │ Image replay │
//!  └────────┘  └────────┘   └──────────────┘
//!   (GStreamer pipelines)
//! ```
//!
//! A backend hands out a [`CameraHandle`]: the live stream, the
//! [`FrameSource`] it feeds, and a channel of stream faults. Dropping or
//! releasing the handle stops the stream.

pub mod frame_source;
pub mod gstreamer;
pub mod image_file;
pub mod poll_thread;
pub mod types;

pub use frame_source::{FramePublisher, FrameSource, frame_channel};
pub use types::*;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Sender half for stream faults (bus errors, end of stream), classified
/// the same way as acquisition errors
pub type FaultSender = mpsc::UnboundedSender<BackendError>;

/// Receiver half for stream faults
pub type FaultReceiver = mpsc::UnboundedReceiver<BackendError>;

/// Camera backend trait
///
/// Implementations must be cheap to query for availability; `acquire` may
/// block (device negotiation, permission prompts) and is run on the blocking
/// pool by the lifecycle controller.
pub trait CameraBackend: Send + Sync {
    /// Get the backend type identifier
    fn backend_type(&self) -> CameraBackendType;

    /// Check if camera capture is possible at all on this system
    fn is_available(&self) -> bool;

    /// Acquire a live stream matching the request
    ///
    /// # Returns
    /// * `Ok(CameraHandle)` - Stream is running and publishing frames
    /// * `Err(BackendError)` - Access was refused or the device failed to start
    fn acquire(&self, request: &CameraRequest) -> BackendResult<CameraHandle>;
}

/// The running side of an acquired camera
pub trait CameraStream: Send {
    /// Stop every track and release the device. Must tolerate repeat calls.
    fn stop(&mut self);
}

/// An acquired camera stream
///
/// Exclusively owned by whoever acquired it. Release happens exactly once,
/// either explicitly or on drop.
pub struct CameraHandle {
    label: String,
    stream: Option<Box<dyn CameraStream>>,
    publisher: FramePublisher,
    frames: FrameSource,
    faults: FaultReceiver,
}

impl CameraHandle {
    pub fn new(
        label: impl Into<String>,
        stream: Box<dyn CameraStream>,
        publisher: FramePublisher,
        faults: FaultReceiver,
    ) -> Self {
        let frames = publisher.subscribe();
        Self {
            label: label.into(),
            stream: Some(stream),
            publisher,
            frames,
            faults,
        }
    }

    /// Human-readable device description
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reader for the newest frame of this stream
    pub fn frames(&self) -> FrameSource {
        self.frames.clone()
    }

    /// Wait for the next stream fault; pends forever once the stream can no
    /// longer report any.
    pub async fn next_fault(&mut self) -> BackendError {
        match self.faults.recv().await {
            Some(fault) => fault,
            None => std::future::pending().await,
        }
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    /// Stop all tracks and detach the stream from the frame slot
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            info!(camera = %self.label, "Releasing camera");
            stream.stop();
            self.publisher.clear();
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("label", &self.label)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Get a concrete live-camera backend instance
pub fn get_backend(backend_type: CameraBackendType) -> Arc<dyn CameraBackend> {
    Arc::new(gstreamer::GstCameraBackend::new(backend_type))
}
