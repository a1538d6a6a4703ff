// SPDX-License-Identifier: GPL-3.0-only

//! Still images replayed as a camera stream
//!
//! Useful for running the scanner without camera hardware: every image is
//! shown for one frame period, in order, looping until the handle is released.

use super::poll_thread::{LoopAction, PollThread};
use super::{
    BackendError, BackendResult, CameraBackend, CameraBackendType, CameraFrame, CameraHandle,
    CameraRequest, CameraStream, FaultSender, frame_channel,
};
use crate::constants::timing::IMAGE_STREAM_FRAME_DURATION;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Load an image file as a tightly packed RGBA frame
pub fn load_image_as_frame(path: &Path) -> BackendResult<CameraFrame> {
    info!(path = %path.display(), "Loading image file");

    let img = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            BackendError::DeviceNotFound(path.display().to_string())
        }
        image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            BackendError::PermissionDenied(path.display().to_string())
        }
        other => BackendError::Other(format!(
            "Failed to load image '{}': {}",
            path.display(),
            other
        )),
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(CameraFrame::from_rgba(width, height, rgba.into_raw()))
}

/// Backend that streams a fixed list of image files
pub struct ImageFileBackend {
    paths: Vec<PathBuf>,
    frame_duration: Duration,
}

impl ImageFileBackend {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            frame_duration: IMAGE_STREAM_FRAME_DURATION,
        }
    }

    pub fn with_frame_duration(mut self, frame_duration: Duration) -> Self {
        self.frame_duration = frame_duration;
        self
    }
}

struct ReplayStream {
    poller: PollThread,
    // Replay never faults; holding the sender keeps the channel open
    _faults: FaultSender,
}

impl CameraStream for ReplayStream {
    fn stop(&mut self) {
        self.poller.stop();
    }
}

impl CameraBackend for ImageFileBackend {
    fn backend_type(&self) -> CameraBackendType {
        // Replay mimics the default live backend
        CameraBackendType::PipeWire
    }

    fn is_available(&self) -> bool {
        !self.paths.is_empty()
    }

    fn acquire(&self, _request: &CameraRequest) -> BackendResult<CameraHandle> {
        if self.paths.is_empty() {
            return Err(BackendError::DeviceNotFound("no image files given".into()));
        }

        let frames = self
            .paths
            .iter()
            .map(|path| load_image_as_frame(path))
            .collect::<BackendResult<Vec<_>>>()?;

        let (publisher, _) = frame_channel();
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();

        let frame_duration = self.frame_duration;
        let thread_publisher = publisher.clone();
        let mut index = 0usize;
        let poller = PollThread::start("qrlink-replay", move || {
            let mut frame = frames[index].clone();
            frame.captured_at = std::time::Instant::now();
            thread_publisher.publish(frame);
            index = (index + 1) % frames.len();
            std::thread::sleep(frame_duration);
            LoopAction::Continue
        });

        let label = format!("{} image(s)", self.paths.len());
        Ok(CameraHandle::new(
            label,
            Box::new(ReplayStream {
                poller,
                _faults: fault_tx,
            }),
            publisher,
            fault_rx,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_device_not_found() {
        let err = load_image_as_frame(Path::new("/nonexistent/qrlink-test.png")).unwrap_err();
        assert!(matches!(err, BackendError::DeviceNotFound(_)));
    }

    #[test]
    fn test_empty_backend_is_unavailable() {
        let backend = ImageFileBackend::new(Vec::new());
        assert!(!backend.is_available());
        assert!(matches!(
            backend.acquire(&CameraRequest::default()),
            Err(BackendError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_replays_image_until_released() {
        let path = std::env::temp_dir().join(format!("qrlink-replay-{}.png", std::process::id()));
        image::RgbaImage::from_pixel(4, 3, image::Rgba([0, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let backend = ImageFileBackend::new(vec![path.clone()])
            .with_frame_duration(Duration::from_millis(5));
        let mut handle = backend.acquire(&CameraRequest::default()).unwrap();
        let frames = handle.frames();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while frames.current_frame().is_none() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let frame = frames.current_frame().expect("replayed frame");
        assert_eq!((frame.width, frame.height), (4, 3));

        handle.release();
        assert!(frames.current_frame().is_none());
        let _ = std::fs::remove_file(path);
    }
}
