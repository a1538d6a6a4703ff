// SPDX-License-Identifier: GPL-3.0-only

//! Delivery of accepted values to the remote endpoint

pub mod http;

pub use http::HttpSubmitter;

use crate::session::SessionId;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// One attempt to deliver a decoded value
///
/// Serialized as `{"user_id", "qr_url", "timestamp"}` with an ISO-8601 UTC
/// timestamp carrying milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub user_id: SessionId,
    pub qr_url: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Submission {
    /// Stamp a value with the current time
    pub fn new(user_id: SessionId, qr_url: impl Into<String>) -> Self {
        Self {
            user_id,
            qr_url: qr_url.into(),
            timestamp: Utc::now(),
        }
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Why a submission failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The endpoint answered with a non-2xx status
    #[error("Server responded with status {0}")]
    Status(u16),

    /// The request never completed
    #[error("Request failed: {0}")]
    Transport(String),

    /// A 2xx response without a JSON body
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

/// Result type for submissions; success carries the server's JSON payload
pub type SubmitResult = Result<serde_json::Value, SubmitError>;

/// Sends submissions somewhere
///
/// The returned future is `'static` so it can be driven on a detached task
/// that outlives the scan cycle which created it.
pub trait Submitter: Send + Sync {
    fn submit(&self, submission: Submission) -> BoxFuture<'static, SubmitResult>;
}
