// SPDX-License-Identifier: GPL-3.0-only

//! Reference receiver for submitted links
//!
//! - `POST /api/qr-link` stores the most recent link
//! - `GET /api/last-url` reports it
//!
//! Only the latest link is kept, in memory.

use crate::constants::endpoint::{LAST_URL_PATH, QR_LINK_PATH};
use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::info;

/// Incoming body; every field is optional so partial posts are still stored
#[derive(Debug, Deserialize)]
struct LinkPayload {
    qr_url: Option<String>,
    user_id: Option<String>,
}

/// Most recently received link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedLink {
    pub url: Option<String>,
    pub user_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Shared receiver state
#[derive(Debug, Clone, Default)]
pub struct ReceiverState {
    last: Arc<Mutex<Option<ReceivedLink>>>,
}

impl ReceiverState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last(&self) -> Option<ReceivedLink> {
        self.last.lock().await.clone()
    }
}

/// Build the router around existing state
pub fn router(state: ReceiverState) -> Router {
    Router::new()
        .route(QR_LINK_PATH, post(receive_link))
        .route(LAST_URL_PATH, get(last_link))
        .with_state(state)
}

/// POST /api/qr-link
async fn receive_link(
    State(state): State<ReceiverState>,
    Json(payload): Json<LinkPayload>,
) -> Json<serde_json::Value> {
    info!(url = ?payload.qr_url, user_id = ?payload.user_id, "Link received");

    *state.last.lock().await = Some(ReceivedLink {
        url: payload.qr_url,
        user_id: payload.user_id,
        received_at: Utc::now(),
    });

    Json(serde_json::json!({
        "status": "success",
        "message": "URL received",
    }))
}

/// GET /api/last-url
async fn last_link(State(state): State<ReceiverState>) -> Json<serde_json::Value> {
    let last = state.last().await;
    let received = last.as_ref();

    Json(serde_json::json!({
        "url": received.and_then(|r| r.url.clone()),
        "user_id": received.and_then(|r| r.user_id.clone()),
        "timestamp": received.map(|r| r.received_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }))
}

/// Serve on an already bound listener until the task is dropped
pub async fn serve_on(listener: TcpListener, state: ReceiverState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Receiver listening");
    }
    axum::serve(listener, router(state)).await
}

/// Bind and serve
pub async fn serve(bind: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    serve_on(listener, ReceiverState::new()).await
}
