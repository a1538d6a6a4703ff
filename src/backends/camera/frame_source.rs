// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot hand-off of the newest camera frame
//!
//! The capture side publishes every frame it receives; the scan side reads
//! whatever is newest when it gets around to it. There is no queue, so a slow
//! reader simply skips frames.

use super::types::CameraFrame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

type Slot = Option<Arc<CameraFrame>>;

/// Create a connected publisher/source pair
pub fn frame_channel() -> (FramePublisher, FrameSource) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx }, FrameSource { rx })
}

/// Writer half, owned by the capture pipeline
#[derive(Debug, Clone)]
pub struct FramePublisher {
    tx: watch::Sender<Slot>,
}

impl FramePublisher {
    /// Replace the current frame (last write wins)
    ///
    /// Safe to call from non-async threads such as GStreamer streaming threads.
    pub fn publish(&self, frame: CameraFrame) {
        self.tx.send_replace(Some(Arc::new(frame)));
    }

    /// Detach the stream: readers see "not ready" until the next publish
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Another reader of this slot
    pub fn subscribe(&self) -> FrameSource {
        FrameSource {
            rx: self.tx.subscribe(),
        }
    }
}

/// Reader half, handed to the scan loop
#[derive(Debug, Clone)]
pub struct FrameSource {
    rx: watch::Receiver<Slot>,
}

impl FrameSource {
    /// Newest frame, or `None` while nothing with real dimensions has arrived
    pub fn current_frame(&self) -> Option<Arc<CameraFrame>> {
        self.rx
            .borrow()
            .as_ref()
            .filter(|frame| frame.has_dimensions())
            .cloned()
    }

    /// Wait until a frame with non-zero dimensions is available
    ///
    /// Returns `false` on timeout or when the publisher went away.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.rx.clone();
        let ready = rx.wait_for(|slot| slot.as_ref().is_some_and(|f| f.has_dimensions()));
        matches!(tokio::time::timeout(timeout, ready).await, Ok(Ok(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_until_first_frame() {
        let (publisher, source) = frame_channel();
        assert!(source.current_frame().is_none());

        publisher.publish(CameraFrame::from_rgba(2, 1, vec![0; 8]));
        let frame = source.current_frame().expect("frame");
        assert_eq!((frame.width, frame.height), (2, 1));
    }

    #[test]
    fn test_zero_dimensions_are_not_ready() {
        let (publisher, source) = frame_channel();
        publisher.publish(CameraFrame::from_rgba(0, 0, Vec::new()));
        assert!(source.current_frame().is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let (publisher, source) = frame_channel();
        publisher.publish(CameraFrame::from_rgba(1, 1, vec![1; 4]));
        publisher.publish(CameraFrame::from_rgba(3, 1, vec![2; 12]));
        assert_eq!(source.current_frame().map(|f| f.width), Some(3));
    }

    #[test]
    fn test_clear_detaches() {
        let (publisher, source) = frame_channel();
        publisher.publish(CameraFrame::from_rgba(1, 1, vec![1; 4]));
        publisher.clear();
        assert!(source.current_frame().is_none());
    }

    #[tokio::test]
    async fn test_wait_ready() {
        let (publisher, source) = frame_channel();
        assert!(!source.wait_ready(Duration::from_millis(10)).await);

        let waiter = tokio::spawn({
            let source = source.clone();
            async move { source.wait_ready(Duration::from_secs(5)).await }
        });
        publisher.publish(CameraFrame::from_rgba(4, 4, vec![0; 64]));
        assert!(waiter.await.unwrap());
    }
}
