// SPDX-License-Identifier: GPL-3.0-only

//! Camera discovery through the GStreamer device monitor

use crate::backends::camera::{CameraBackendType, CameraDevice, FacingMode};
use crate::constants::camera::LOCATION_PROPERTY;
use gstreamer::prelude::*;
use tracing::{debug, info, warn};

/// Read a device property regardless of whether the provider stored it as
/// a string or an integer
fn property_string(props: &gstreamer::StructureRef, name: &str) -> Option<String> {
    if let Ok(value) = props.get::<String>(name) {
        return Some(value);
    }
    if let Ok(value) = props.get::<i32>(name) {
        return Some(value.to_string());
    }
    if let Ok(value) = props.get::<u32>(name) {
        return Some(value.to_string());
    }
    if let Ok(value) = props.get::<i64>(name) {
        return Some(value.to_string());
    }
    props.get::<u64>(name).ok().map(|v| v.to_string())
}

/// Translate one monitored device into the identifier its backend understands
fn to_camera_device(
    backend: CameraBackendType,
    device: &gstreamer::Device,
) -> Option<CameraDevice> {
    let props = device.properties()?;
    let name = device.display_name().to_string();

    let path = match backend {
        CameraBackendType::PipeWire => {
            property_string(&props, "object.serial").map(|s| format!("pipewire-serial-{}", s))?
        }
        CameraBackendType::V4l2 => property_string(&props, "api.v4l2.path")
            .or_else(|| property_string(&props, "device.path"))
            .filter(|p| p.starts_with("/dev/video"))?,
    };

    let location = property_string(&props, LOCATION_PROPERTY);
    debug!(name = %name, path = %path, ?location, "Found video camera");

    Some(CameraDevice {
        name,
        path,
        location,
    })
}

/// List the cameras a backend can open
///
/// Returns an empty list when GStreamer or the device monitor is unusable.
pub fn enumerate_cameras(backend: CameraBackendType) -> Vec<CameraDevice> {
    if let Err(e) = gstreamer::init() {
        warn!(error = %e, "GStreamer init failed");
        return Vec::new();
    }

    let monitor = gstreamer::DeviceMonitor::new();
    monitor.add_filter(Some("Video/Source"), None);

    if let Err(e) = monitor.start() {
        warn!(error = %e, "Failed to start device monitor");
        return Vec::new();
    }
    let devices = monitor.devices();
    monitor.stop();

    let cameras: Vec<CameraDevice> = devices
        .iter()
        .filter_map(|device| to_camera_device(backend, device))
        .collect();

    info!(%backend, count = cameras.len(), "Enumerated cameras");
    cameras
}

/// Pick the first camera facing the requested way
///
/// `None` means no camera reports a matching placement and the source
/// element's default device should be used.
pub fn pick_device(cameras: &[CameraDevice], facing: FacingMode) -> Option<&CameraDevice> {
    cameras.iter().find(|camera| {
        camera
            .location
            .as_deref()
            .is_some_and(|location| facing.matches_location(location))
    })
}
