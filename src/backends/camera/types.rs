// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use crate::constants::camera::{IDEAL_HEIGHT, IDEAL_WIDTH};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackendType {
    /// PipeWire via pipewiresrc (modern Linux standard)
    #[default]
    PipeWire,
    /// Direct V4L2 access via v4l2src
    V4l2,
}

impl CameraBackendType {
    /// GStreamer source element used by this backend
    pub fn source_element(&self) -> &'static str {
        match self {
            CameraBackendType::PipeWire => "pipewiresrc",
            CameraBackendType::V4l2 => "v4l2src",
        }
    }

    /// Parse a backend name as used in config files and the environment
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pipewire" | "pw" => Some(Self::PipeWire),
            "v4l2" | "v4l" => Some(Self::V4l2),
            _ => None,
        }
    }
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::PipeWire => write!(f, "PipeWire"),
            CameraBackendType::V4l2 => write!(f, "V4L2"),
        }
    }
}

/// Which way the requested camera should face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera, pointing away from the user
    #[default]
    Environment,
    /// Front camera, pointing at the user
    User,
}

impl FacingMode {
    /// Whether a libcamera location string ("front", "back", "external") suits this facing
    pub fn matches_location(&self, location: &str) -> bool {
        match self {
            FacingMode::Environment => matches!(location, "back" | "external"),
            FacingMode::User => location == "front",
        }
    }
}

/// Parameters for acquiring a camera stream
///
/// Video only; audio is never requested. The resolution is a preference:
/// backends try it first and fall back to whatever the device negotiates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraRequest {
    /// Explicit device (PipeWire serial/node, object path or /dev/videoN)
    pub device_path: Option<String>,
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CameraRequest {
    fn default() -> Self {
        Self {
            device_path: None,
            facing: FacingMode::Environment,
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
        }
    }
}

/// Represents a camera device
#[derive(Debug, Clone)]
pub struct CameraDevice {
    pub name: String,
    /// Path understood by the backend's source element
    pub path: String,
    /// Sensor placement: "front", "back" or "external" when known
    pub location: Option<String>,
}

/// Pixel format for camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    /// This is what the capture pipelines deliver
    RGBA,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::RGBA => 4,
            Self::Gray8 => 1,
        }
    }

    /// Parse format from GStreamer format string
    pub fn from_gst_format(format: &str) -> Option<Self> {
        match format {
            "RGBA" | "RGBx" => Some(Self::RGBA),
            "GRAY8" | "GREY" | "Y8" => Some(Self::Gray8),
            _ => None,
        }
    }
}

/// A single frame from the camera
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a frame from tightly packed RGBA pixels
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: Arc::from(data),
            format: PixelFormat::RGBA,
            stride: width * 4,
            captured_at: Instant::now(),
        }
    }

    /// A frame is usable once the stream has reported real dimensions
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Copy pixel data into a tightly packed RGBA buffer (stride padding removed)
    ///
    /// Gray frames are expanded to opaque RGBA. Rows that would run past the
    /// end of the buffer are skipped, so a short buffer yields a short result.
    pub fn packed_rgba(&self) -> Vec<u8> {
        let width = self.width as usize;
        let height = self.height as usize;
        let stride = self.stride as usize;
        let row_bytes = width * self.format.bytes_per_pixel();

        let mut result = Vec::with_capacity(width * height * 4);

        for y in 0..height {
            let row_start = y * stride;
            let row_end = row_start + row_bytes;
            let Some(row) = self.data.get(row_start..row_end) else {
                continue;
            };
            match self.format {
                PixelFormat::RGBA => result.extend_from_slice(row),
                PixelFormat::Gray8 => {
                    for &luma in row {
                        result.extend_from_slice(&[luma, luma, luma, 255]);
                    }
                }
            }
        }

        result
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Backend is not available on this system
    #[error("Backend not available: {0}")]
    NotAvailable(String),
    /// Access to the device was refused
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Camera device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// Camera is held by someone else
    #[error("Device busy: {0}")]
    DeviceBusy(String),
    /// Failed to initialize the capture pipeline
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
    /// The running stream failed
    #[error("Stream error: {0}")]
    Stream(String),
    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl BackendError {
    /// The message without the category prefix
    pub fn detail(&self) -> &str {
        match self {
            Self::NotAvailable(detail)
            | Self::PermissionDenied(detail)
            | Self::DeviceNotFound(detail)
            | Self::DeviceBusy(detail)
            | Self::InitializationFailed(detail)
            | Self::Stream(detail)
            | Self::Other(detail) => detail,
        }
    }
}
