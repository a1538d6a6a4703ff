// SPDX-License-Identifier: GPL-3.0-only

//! Live camera backend built on GStreamer
//!
//! Both PipeWire and direct V4L2 capture share one pipeline shape; only the
//! source element and its device property differ.

pub mod enumeration;
pub mod pipeline;

pub use enumeration::{enumerate_cameras, pick_device};
pub use pipeline::CapturePipeline;

use super::{
    BackendError, BackendResult, CameraBackend, CameraBackendType, CameraHandle, CameraRequest,
    frame_channel,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Camera backend driving a `pipewiresrc` or `v4l2src` pipeline
pub struct GstCameraBackend {
    backend_type: CameraBackendType,
}

impl GstCameraBackend {
    pub fn new(backend_type: CameraBackendType) -> Self {
        Self { backend_type }
    }

    /// Resolve which device to open for a request
    fn resolve_device(&self, request: &CameraRequest) -> Option<String> {
        if let Some(path) = request.device_path.as_ref().filter(|p| !p.is_empty()) {
            return Some(path.clone());
        }

        let cameras = enumerate_cameras(self.backend_type);
        match pick_device(&cameras, request.facing) {
            Some(camera) => {
                info!(name = %camera.name, facing = ?request.facing, "Selected camera by facing");
                Some(camera.path.clone())
            }
            None => {
                debug!(facing = ?request.facing, "No camera reports a matching placement");
                None
            }
        }
    }
}

impl CameraBackend for GstCameraBackend {
    fn backend_type(&self) -> CameraBackendType {
        self.backend_type
    }

    fn is_available(&self) -> bool {
        if gstreamer::init().is_err() {
            return false;
        }
        gstreamer::ElementFactory::find(self.backend_type.source_element()).is_some()
    }

    fn acquire(&self, request: &CameraRequest) -> BackendResult<CameraHandle> {
        if !self.is_available() {
            return Err(BackendError::NotAvailable(format!(
                "{} not available",
                self.backend_type.source_element()
            )));
        }

        let device_path = self.resolve_device(request);
        let (publisher, _) = frame_channel();
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();

        let pipeline = CapturePipeline::start(
            self.backend_type,
            device_path.as_deref(),
            (request.ideal_width, request.ideal_height),
            publisher.clone(),
            fault_tx,
        )?;

        let label = match device_path {
            Some(path) => format!("{} {}", self.backend_type, path),
            None => format!("{} default", self.backend_type),
        };

        Ok(CameraHandle::new(label, Box::new(pipeline), publisher, fault_rx))
    }
}
