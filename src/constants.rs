// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Camera acquisition defaults
pub mod camera {
    /// Preferred capture width (a hint, not a requirement)
    pub const IDEAL_WIDTH: u32 = 1280;

    /// Preferred capture height (a hint, not a requirement)
    pub const IDEAL_HEIGHT: u32 = 720;

    /// PipeWire/libcamera property carrying the sensor placement
    pub const LOCATION_PROPERTY: &str = "api.libcamera.location";
}

/// GStreamer pipeline settings
pub mod pipeline {
    /// Maximum buffer queue size (keep small, only the newest frame matters)
    pub const MAX_BUFFERS: u32 = 1;

    /// Output pixel format for appsink
    pub const OUTPUT_FORMAT: &str = "RGBA";

    /// Name of the appsink element inside the launch string
    pub const SINK_NAME: &str = "sink";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// How long the bus watcher blocks per poll before re-checking its stop flag
    pub const BUS_POLL_INTERVAL_MS: u64 = 100;

    /// How long start-up waits for the appsink caps before handing the pipeline out
    pub const NEGOTIATION_TIMEOUT_MS: u64 = 2000;

    /// Shortest accepted gap between scan cycles
    pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

    /// Default gap between scan cycles (one display refresh at ~60 Hz)
    pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

    /// Default time allowed for the first frame to arrive after acquisition
    pub const DEFAULT_WARMUP_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default HTTP request timeout for submissions
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Frame period used when replaying still images as a stream
    pub const IMAGE_STREAM_FRAME_DURATION: Duration = Duration::from_millis(33);
}

/// Remote endpoint
pub mod endpoint {
    /// Default base URL of the receiving server
    pub const DEFAULT_BASE_URL: &str = "http://localhost:4433";

    /// Path that accepts decoded links
    pub const QR_LINK_PATH: &str = "/api/qr-link";

    /// Path that reports the most recently received link
    pub const LAST_URL_PATH: &str = "/api/last-url";

    /// Default bind address for `qrlink serve`
    pub const DEFAULT_BIND: &str = "0.0.0.0:4433";
}

/// Event and command channel capacities
pub mod channels {
    /// Queued controller commands before senders wait
    pub const COMMAND_CAPACITY: usize = 16;

    /// Buffered events per subscriber before the slowest one lags
    pub const EVENT_CAPACITY: usize = 64;
}

/// Application info
pub mod app_info {
    /// Version string including the commit it was built from
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Prefix for every generated session identifier
    pub const SESSION_PREFIX: &str = "user_";

    /// Number of random characters following the session prefix
    pub const SESSION_SUFFIX_LEN: usize = 9;
}
