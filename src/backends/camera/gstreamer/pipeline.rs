// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture pipeline feeding the frame slot
//!
//! ```text
//! pipewiresrc / v4l2src ! [caps] ! videoconvert ! video/x-raw,format=RGBA ! appsink
//!                                                                          │
//!                                           new_sample ──► FramePublisher ─┘
//! bus (Error / EOS) ──► PollThread ──► fault channel
//! ```
//!
//! Caps negotiation can fail after the pipeline reports PLAYING, so start-up
//! watches the bus until the appsink pad has caps before handing the
//! pipeline out.

use crate::backends::camera::poll_thread::{LoopAction, PollThread};
use crate::backends::camera::{
    BackendError, BackendResult, CameraBackendType, CameraFrame, CameraStream, FaultSender,
    FramePublisher, PixelFormat,
};
use crate::constants::{pipeline, timing};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Source element properties selecting a specific device
///
/// Accepts the identifiers produced by enumeration (`pipewire-serial-N`,
/// `pipewire-N`, `v4l2:/dev/videoN`) as well as plain `/dev/videoN` paths.
pub fn device_property(backend: CameraBackendType, device_path: Option<&str>) -> String {
    let Some(dev_path) = device_path.filter(|p| !p.is_empty()) else {
        info!(%backend, "Using default camera (auto-select)");
        return String::new();
    };

    match backend {
        CameraBackendType::PipeWire => {
            if let Some(serial) = dev_path.strip_prefix("pipewire-serial-") {
                info!(serial, "Using PipeWire object.serial");
                format!("target-object={} ", serial)
            } else if let Some(node_id) = dev_path.strip_prefix("pipewire-") {
                info!(node_id, "Using PipeWire node ID");
                format!("target-object={} ", node_id)
            } else if dev_path.starts_with("v4l2:") {
                info!(object_path = %dev_path, "Using PipeWire object.path");
                format!("path={} ", dev_path)
            } else if dev_path.starts_with("/dev/video") {
                info!(dev_path, "Using V4L2 device via PipeWire");
                format!("path=v4l2:{} ", dev_path)
            } else {
                warn!(dev_path, "Unknown device path format, using path property");
                format!("path={} ", dev_path)
            }
        }
        CameraBackendType::V4l2 => {
            let device = dev_path.strip_prefix("v4l2:").unwrap_or(dev_path);
            format!("device={} ", device)
        }
    }
}

/// Build the launch string for one attempt
///
/// With a preferred size the source is constrained to raw video at that
/// size; without one `decodebin` is allowed to pick whatever the device
/// offers (including MJPEG).
pub fn launch_string(
    backend: CameraBackendType,
    device_prop: &str,
    preferred_size: Option<(u32, u32)>,
) -> String {
    let source = format!("{} {}do-timestamp=true", backend.source_element(), device_prop);
    let sink = format!(
        "videoconvert ! video/x-raw,format={} ! appsink name={}",
        pipeline::OUTPUT_FORMAT,
        pipeline::SINK_NAME
    );

    match preferred_size {
        Some((width, height)) => format!(
            "{} ! video/x-raw,width=(int){},height=(int){} ! {}",
            source, width, height, sink
        ),
        None => format!("{} ! decodebin ! {}", source, sink),
    }
}

/// Map a GStreamer error message to an acquisition error
pub fn classify_error(err: &gstreamer::glib::Error, detail: String) -> BackendError {
    match err.kind::<gstreamer::ResourceError>() {
        Some(gstreamer::ResourceError::NotAuthorized) => BackendError::PermissionDenied(detail),
        Some(gstreamer::ResourceError::NotFound) => BackendError::DeviceNotFound(detail),
        Some(gstreamer::ResourceError::Busy) => BackendError::DeviceBusy(detail),
        Some(
            gstreamer::ResourceError::OpenRead
            | gstreamer::ResourceError::OpenReadWrite
            | gstreamer::ResourceError::OpenWrite,
        ) if detail.to_ascii_lowercase().contains("permission denied") => {
            BackendError::PermissionDenied(detail)
        }
        _ => BackendError::InitializationFailed(detail),
    }
}

/// Whether an error means the requested caps cannot be produced
///
/// A source that cannot negotiate posts a generic stream failure whose debug
/// text carries the `not-negotiated` flow return.
pub fn is_negotiation_error(err: &gstreamer::glib::Error, detail: &str) -> bool {
    match err.kind::<gstreamer::StreamError>() {
        Some(gstreamer::StreamError::Format) => return true,
        Some(gstreamer::StreamError::Failed) if detail.contains("not-negotiated") => return true,
        _ => {}
    }
    matches!(
        err.kind::<gstreamer::CoreError>(),
        Some(gstreamer::CoreError::Negotiation | gstreamer::CoreError::Caps)
    )
}

/// Map an error posted on the bus of a running pipeline to a stream fault
///
/// Access problems keep their category; anything else is a stream failure.
pub fn classify_fault(err: &gstreamer::glib::Error, detail: String) -> BackendError {
    match classify_error(err, detail) {
        BackendError::InitializationFailed(detail) => BackendError::Stream(detail),
        classified => classified,
    }
}

fn error_detail(err: &gstreamer::message::Error) -> String {
    match err.debug() {
        Some(debug) => format!("{} ({})", err.error(), debug),
        None => err.error().to_string(),
    }
}

/// Pull the first error off a pipeline bus that failed to start
fn startup_error(pipeline: &gstreamer::Pipeline, fallback: String) -> BackendError {
    let Some(bus) = pipeline.bus() else {
        return BackendError::InitializationFailed(fallback);
    };

    while let Some(msg) = bus.pop_filtered(&[gstreamer::MessageType::Error]) {
        if let gstreamer::MessageView::Error(err) = msg.view() {
            let detail = error_detail(err);
            error!(error = %detail, "Pipeline reported error while starting");
            return classify_error(&err.error(), detail);
        }
    }

    BackendError::InitializationFailed(fallback)
}

fn shut_down(pipeline: &gstreamer::Pipeline) {
    let _ = pipeline.set_state(gstreamer::State::Null);
    let _ = pipeline.state(gstreamer::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
}

/// Parse and start one launch string
fn launch(pipeline_str: &str) -> BackendResult<gstreamer::Pipeline> {
    info!(pipeline = %pipeline_str, "Attempting to launch pipeline");

    let pipeline = gstreamer::parse::launch(pipeline_str)
        .map_err(|e| BackendError::InitializationFailed(format!("Failed to parse pipeline: {}", e)))?
        .dynamic_cast::<gstreamer::Pipeline>()
        .map_err(|_| BackendError::InitializationFailed("Failed to cast to pipeline".into()))?;

    if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
        let err = startup_error(&pipeline, format!("Failed to set pipeline to PLAYING: {}", e));
        shut_down(&pipeline);
        return Err(err);
    }

    let (result, state, pending) =
        pipeline.state(gstreamer::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
    debug!(?result, ?state, ?pending, "State query completed");

    let playing = result.is_ok() && state == gstreamer::State::Playing;
    // Frames arrive once the device is ready
    let transitioning = matches!(result, Ok(gstreamer::StateChangeSuccess::Async))
        && pending == gstreamer::State::Playing;

    if playing || transitioning {
        info!(?state, ?pending, "Pipeline started");
        Ok(pipeline)
    } else {
        let err = startup_error(
            &pipeline,
            format!("Pipeline failed to start (state: {:?}, result: {:?})", state, result),
        );
        shut_down(&pipeline);
        Err(err)
    }
}

/// A running capture pipeline
pub struct CapturePipeline {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    bus_watch: Option<PollThread>,
    stopped: bool,
}

impl CapturePipeline {
    /// Launch a capture pipeline and start publishing frames
    ///
    /// The preferred size is tried first; if the device refuses it the
    /// pipeline is relaunched unconstrained. Access errors (denied, missing,
    /// busy) are returned immediately since a different size will not help.
    pub fn start(
        backend: CameraBackendType,
        device_path: Option<&str>,
        preferred_size: (u32, u32),
        publisher: FramePublisher,
        faults: FaultSender,
    ) -> BackendResult<Self> {
        gstreamer::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let device_prop = device_property(backend, device_path);

        let preferred = launch_string(backend, &device_prop, Some(preferred_size));
        let (pipeline, appsink) = match start_capture(&preferred, &publisher) {
            Ok(started) => started,
            Err(BackendError::InitializationFailed(reason)) => {
                warn!(%reason, "Preferred resolution rejected, retrying without constraints");
                start_capture(&launch_string(backend, &device_prop, None), &publisher)?
            }
            Err(e) => return Err(e),
        };

        let bus_watch = pipeline.bus().map(|bus| {
            PollThread::start("qrlink-bus", move || watch_bus(&bus, &faults))
        });

        info!(%backend, "Camera pipeline running");

        Ok(Self {
            pipeline,
            appsink,
            bus_watch,
            stopped: false,
        })
    }
}

/// Launch one attempt, wire the appsink and wait for caps negotiation
fn start_capture(
    pipeline_str: &str,
    publisher: &FramePublisher,
) -> BackendResult<(gstreamer::Pipeline, AppSink)> {
    let pipeline = launch(pipeline_str)?;

    let appsink = match find_appsink(&pipeline) {
        Ok(appsink) => appsink,
        Err(e) => {
            shut_down(&pipeline);
            return Err(e);
        }
    };

    appsink.set_property("sync", false);
    appsink.set_property("max-buffers", pipeline::MAX_BUFFERS);
    appsink.set_property("drop", true);
    appsink.set_property("enable-last-sample", false);
    appsink.set_callbacks(
        gstreamer_app::AppSinkCallbacks::builder()
            .new_sample(frame_callback(publisher.clone()))
            .build(),
    );

    if let Err(e) = await_negotiation(&pipeline, &appsink) {
        appsink.set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        shut_down(&pipeline);
        return Err(e);
    }

    Ok((pipeline, appsink))
}

fn find_appsink(pipeline: &gstreamer::Pipeline) -> BackendResult<AppSink> {
    pipeline
        .by_name(pipeline::SINK_NAME)
        .ok_or_else(|| BackendError::InitializationFailed("Failed to get appsink".into()))?
        .dynamic_cast::<AppSink>()
        .map_err(|_| BackendError::InitializationFailed("Failed to cast appsink".into()))
}

/// Block until the appsink pad has caps or the bus reports an error
///
/// Negotiation failures come back as `InitializationFailed` so the caller
/// can retry without the size constraint. A device that is merely slow is
/// not an error here; the first-frame warm-up covers it.
fn await_negotiation(pipeline: &gstreamer::Pipeline, appsink: &AppSink) -> BackendResult<()> {
    let Some(bus) = pipeline.bus() else {
        return Ok(());
    };
    let negotiated = || {
        appsink
            .static_pad("sink")
            .is_some_and(|pad| pad.current_caps().is_some())
    };

    let deadline = Instant::now() + Duration::from_millis(timing::NEGOTIATION_TIMEOUT_MS);
    while Instant::now() < deadline {
        if negotiated() {
            debug!("Caps negotiated");
            return Ok(());
        }

        let Some(msg) = bus.timed_pop_filtered(
            gstreamer::ClockTime::from_mseconds(timing::BUS_POLL_INTERVAL_MS),
            &[gstreamer::MessageType::Error],
        ) else {
            continue;
        };

        if let gstreamer::MessageView::Error(err) = msg.view() {
            let detail = error_detail(err);
            if is_negotiation_error(&err.error(), &detail) {
                warn!(error = %detail, "Caps negotiation failed");
                return Err(BackendError::InitializationFailed(detail));
            }
            error!(error = %detail, "Pipeline reported error while negotiating");
            return Err(classify_error(&err.error(), detail));
        }
    }

    debug!("No caps yet, leaving the rest to the first-frame wait");
    Ok(())
}

/// Appsink callback copying each sample into the frame slot
fn frame_callback(
    publisher: FramePublisher,
) -> impl Fn(&AppSink) -> Result<gstreamer::FlowSuccess, gstreamer::FlowError> + Send + 'static {
    let counter = AtomicU64::new(0);

    move |appsink| {
        let frame_num = counter.fetch_add(1, Ordering::Relaxed);
        let captured_at = Instant::now();

        let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
        let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;

        if buffer.flags().contains(gstreamer::BufferFlags::CORRUPTED) {
            if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                warn!(frame = frame_num, "Buffer marked as corrupted, skipping frame");
            }
            return Ok(gstreamer::FlowSuccess::Ok);
        }

        let caps = sample.caps().ok_or(gstreamer::FlowError::Error)?;
        let video_info = VideoInfo::from_caps(caps).map_err(|_| gstreamer::FlowError::Error)?;
        let map = buffer.map_readable().map_err(|_| gstreamer::FlowError::Error)?;

        let format =
            PixelFormat::from_gst_format(video_info.format().to_str()).unwrap_or(PixelFormat::RGBA);

        publisher.publish(CameraFrame {
            width: video_info.width(),
            height: video_info.height(),
            data: Arc::from(map.as_slice()),
            format,
            stride: video_info.stride()[0].max(0) as u32,
            captured_at,
        });

        if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                frame = frame_num,
                width = video_info.width(),
                height = video_info.height(),
                copy_us = captured_at.elapsed().as_micros(),
                "Frame published"
            );
        }

        Ok(gstreamer::FlowSuccess::Ok)
    }
}

/// One bus poll: forward errors and end-of-stream as faults
fn watch_bus(bus: &gstreamer::Bus, faults: &FaultSender) -> LoopAction {
    let Some(msg) = bus.timed_pop_filtered(
        gstreamer::ClockTime::from_mseconds(timing::BUS_POLL_INTERVAL_MS),
        &[gstreamer::MessageType::Error, gstreamer::MessageType::Eos],
    ) else {
        return LoopAction::Continue;
    };

    let fault = match msg.view() {
        gstreamer::MessageView::Error(err) => {
            error!(error = %err.error(), debug = ?err.debug(), "Camera stream error");
            classify_fault(&err.error(), err.error().to_string())
        }
        gstreamer::MessageView::Eos(..) => {
            warn!("Camera stream ended");
            BackendError::Stream("camera stream ended".into())
        }
        _ => return LoopAction::Continue,
    };

    if faults.send(fault).is_err() {
        return LoopAction::Stop;
    }
    LoopAction::Continue
}

impl CameraStream for CapturePipeline {
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        info!("Stopping camera pipeline");
        // Drop the callback's publisher reference before tearing down
        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());

        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!(error = %e, "Failed to set pipeline to NULL");
        }
        let (result, state, _) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        debug!(?result, ?state, "Pipeline stopped");

        if let Some(mut bus_watch) = self.bus_watch.take() {
            bus_watch.stop();
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipewire_device_properties() {
        let backend = CameraBackendType::PipeWire;
        assert_eq!(device_property(backend, None), "");
        assert_eq!(device_property(backend, Some("")), "");
        assert_eq!(
            device_property(backend, Some("pipewire-serial-2146")),
            "target-object=2146 "
        );
        assert_eq!(device_property(backend, Some("pipewire-76")), "target-object=76 ");
        assert_eq!(
            device_property(backend, Some("/dev/video0")),
            "path=v4l2:/dev/video0 "
        );
    }

    #[test]
    fn test_v4l2_device_properties() {
        let backend = CameraBackendType::V4l2;
        assert_eq!(
            device_property(backend, Some("v4l2:/dev/video2")),
            "device=/dev/video2 "
        );
        assert_eq!(
            device_property(backend, Some("/dev/video0")),
            "device=/dev/video0 "
        );
    }

    #[test]
    fn test_launch_string_with_preferred_size() {
        let s = launch_string(CameraBackendType::V4l2, "device=/dev/video0 ", Some((1280, 720)));
        assert!(s.starts_with("v4l2src device=/dev/video0 do-timestamp=true"));
        assert!(s.contains("width=(int)1280,height=(int)720"));
        assert!(s.ends_with("video/x-raw,format=RGBA ! appsink name=sink"));
        assert!(!s.contains("decodebin"));
    }

    #[test]
    fn test_launch_string_fallback_uses_decodebin() {
        let s = launch_string(CameraBackendType::PipeWire, "", None);
        assert!(s.starts_with("pipewiresrc do-timestamp=true ! decodebin"));
        assert!(!s.contains("width="));
    }

    #[test]
    fn test_classify_resource_errors() {
        let denied = gstreamer::glib::Error::new(gstreamer::ResourceError::NotAuthorized, "no");
        assert!(matches!(
            classify_error(&denied, "no".into()),
            BackendError::PermissionDenied(_)
        ));

        let busy = gstreamer::glib::Error::new(gstreamer::ResourceError::Busy, "busy");
        assert!(matches!(
            classify_error(&busy, "busy".into()),
            BackendError::DeviceBusy(_)
        ));

        let missing = gstreamer::glib::Error::new(gstreamer::ResourceError::NotFound, "gone");
        assert!(matches!(
            classify_error(&missing, "gone".into()),
            BackendError::DeviceNotFound(_)
        ));

        let open = gstreamer::glib::Error::new(gstreamer::ResourceError::OpenRead, "x");
        assert!(matches!(
            classify_error(&open, "Could not open device: Permission denied".into()),
            BackendError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_error(&open, "Could not open device".into()),
            BackendError::InitializationFailed(_)
        ));
    }

    #[test]
    fn test_negotiation_errors() {
        let failed = gstreamer::glib::Error::new(
            gstreamer::StreamError::Failed,
            "Internal data stream error.",
        );
        assert!(is_negotiation_error(
            &failed,
            "Internal data stream error. (streaming stopped, reason not-negotiated (-4))"
        ));
        assert!(!is_negotiation_error(&failed, "Internal data stream error."));

        let caps = gstreamer::glib::Error::new(gstreamer::CoreError::Negotiation, "caps");
        assert!(is_negotiation_error(&caps, "caps"));

        let busy = gstreamer::glib::Error::new(gstreamer::ResourceError::Busy, "busy");
        assert!(!is_negotiation_error(&busy, "busy"));
    }

    #[test]
    fn test_runtime_faults_keep_access_category() {
        let denied = gstreamer::glib::Error::new(gstreamer::ResourceError::NotAuthorized, "no");
        assert!(matches!(
            classify_fault(&denied, "no".into()),
            BackendError::PermissionDenied(_)
        ));

        let failed = gstreamer::glib::Error::new(gstreamer::StreamError::Failed, "internal");
        assert!(matches!(
            classify_fault(&failed, "internal".into()),
            BackendError::Stream(_)
        ));
    }
}
