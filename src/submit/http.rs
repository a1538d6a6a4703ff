// SPDX-License-Identifier: GPL-3.0-only

//! JSON-over-HTTP submitter

use super::{Submission, SubmitError, SubmitResult, Submitter};
use crate::constants::endpoint::QR_LINK_PATH;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Posts each submission to `{base}/api/qr-link`
#[derive(Debug, Clone)]
pub struct HttpSubmitter {
    client: reqwest::Client,
    url: String,
}

impl HttpSubmitter {
    /// Build a submitter for an endpoint base URL such as `https://host:4433`
    ///
    /// `accept_invalid_certs` allows self-signed receivers on a local network.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| SubmitError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let url = format!("{}{}", base_url.trim_end_matches('/'), QR_LINK_PATH);
        info!(url = %url, accept_invalid_certs, "HTTP submitter ready");

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Submitter for HttpSubmitter {
    fn submit(&self, submission: Submission) -> BoxFuture<'static, SubmitResult> {
        let client = self.client.clone();
        let url = self.url.clone();

        async move {
            debug!(url = %url, value = %submission.qr_url, "Submitting value");

            let response = client
                .post(&url)
                .json(&submission)
                .send()
                .await
                .map_err(|e| SubmitError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                warn!(status = status.as_u16(), "Submission rejected");
                return Err(SubmitError::Status(status.as_u16()));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| SubmitError::InvalidBody(e.to_string()))
        }
        .boxed()
    }
}
