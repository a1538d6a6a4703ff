// SPDX-License-Identifier: GPL-3.0-only

//! Scanner configuration
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config PATH`, else `$XDG_CONFIG_HOME/qrlink/config.toml`)
//! 3. Environment (`QRLINK_ENDPOINT`, `QRLINK_BACKEND`, `QRLINK_DEVICE`,
//!    `QRLINK_FRAME_INTERVAL_MS`)
//! 4. Command line flags (applied by the binary)
//!
//! ```toml
//! endpoint = "https://192.168.1.20:4433"
//! backend = "pipewire"          # pipewire | v4l2
//! facing = "environment"        # environment | user
//! ideal_width = 1280
//! ideal_height = 720
//! frame_interval_ms = 16
//! accept_invalid_certs = true
//! ```

use crate::backends::camera::{CameraBackendType, CameraRequest, FacingMode};
use crate::constants::{camera, endpoint, timing};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the receiving server
    pub endpoint: String,
    /// Camera backend to use (PipeWire or V4L2)
    pub backend: CameraBackendType,
    /// Explicit camera device; facing-mode selection when unset
    pub device_path: Option<String>,
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// Gap between scan cycles
    pub frame_interval_ms: u64,
    /// Time allowed for the first frame after the camera opens
    pub warmup_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Accept self-signed TLS certificates from the endpoint
    pub accept_invalid_certs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: endpoint::DEFAULT_BASE_URL.to_string(),
            backend: CameraBackendType::default(),
            device_path: None,
            facing: FacingMode::default(),
            ideal_width: camera::IDEAL_WIDTH,
            ideal_height: camera::IDEAL_HEIGHT,
            frame_interval_ms: timing::DEFAULT_FRAME_INTERVAL.as_millis() as u64,
            warmup_timeout_secs: timing::DEFAULT_WARMUP_TIMEOUT.as_secs(),
            request_timeout_secs: timing::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            accept_invalid_certs: false,
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/qrlink/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("qrlink").join("config.toml"))
    }

    /// Parse a TOML document
    pub fn from_toml(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Read a config file; a missing file at the default location is not an error
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path.is_some();
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() || explicit => {
                info!(path = %path.display(), "Loading config");
                let contents =
                    std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                        path: path.display().to_string(),
                        source,
                    })?;
                Self::from_toml(&contents, &path.display().to_string())?
            }
            Some(path) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("QRLINK_ENDPOINT") {
            debug!(url = %url, "Overriding endpoint from environment");
            self.endpoint = url;
        }

        if let Some(name) = lookup("QRLINK_BACKEND") {
            match CameraBackendType::parse(&name) {
                Some(backend) => self.backend = backend,
                None => warn!(value = %name, "Ignoring unknown QRLINK_BACKEND"),
            }
        }

        if let Some(device) = lookup("QRLINK_DEVICE") {
            self.device_path = Some(device).filter(|d| !d.is_empty());
        }

        if let Some(interval) = lookup("QRLINK_FRAME_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => self.frame_interval_ms = ms,
                Err(_) => warn!(value = %interval, "Ignoring invalid QRLINK_FRAME_INTERVAL_MS"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "endpoint must start with http:// or https://, got: {}",
                self.endpoint
            )));
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "frame_interval_ms must be greater than 0".into(),
            ));
        }
        if self.ideal_width == 0 || self.ideal_height == 0 {
            return Err(ConfigError::Invalid(
                "ideal resolution must be non-zero".into(),
            ));
        }
        if self.warmup_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn camera_request(&self) -> CameraRequest {
        CameraRequest {
            device_path: self.device_path.clone(),
            facing: self.facing,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn warmup_timeout(&self) -> Duration {
        Duration::from_secs(self.warmup_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
