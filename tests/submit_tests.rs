// SPDX-License-Identifier: GPL-3.0-only

//! HTTP submitter against the reference receiver

use qrlink::SessionId;
use qrlink::receiver::{ReceiverState, serve_on};
use qrlink::submit::{HttpSubmitter, Submission, SubmitError, Submitter};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

async fn start_receiver() -> (SocketAddr, ReceiverState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = ReceiverState::new();
    tokio::spawn(serve_on(listener, state.clone()));
    (addr, state)
}

fn submitter(base: &str) -> HttpSubmitter {
    HttpSubmitter::new(base, Duration::from_secs(5), false).unwrap()
}

#[tokio::test]
async fn test_submission_reaches_receiver() {
    let (addr, state) = start_receiver().await;
    let base = format!("http://{}", addr);

    let body = submitter(&base)
        .submit(Submission::new(
            SessionId::from_string("user_abcdef123"),
            "https://example.com/menu",
        ))
        .await
        .unwrap();

    assert_eq!(
        body,
        serde_json::json!({"status": "success", "message": "URL received"})
    );

    let last = state.last().await.expect("link stored");
    assert_eq!(last.url.as_deref(), Some("https://example.com/menu"));
    assert_eq!(last.user_id.as_deref(), Some("user_abcdef123"));

    // The receiver reports it back
    let report: serde_json::Value = reqwest::get(format!("{}/api/last-url", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["url"], "https://example.com/menu");
    assert_eq!(report["user_id"], "user_abcdef123");
    assert!(report["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')));
}

#[tokio::test]
async fn test_last_url_before_any_submission() {
    let (addr, _state) = start_receiver().await;

    let report: serde_json::Value = reqwest::get(format!("http://{}/api/last-url", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(report["url"].is_null());
    assert!(report["timestamp"].is_null());
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let (addr, state) = start_receiver().await;

    // No route under this prefix
    let err = submitter(&format!("http://{}/missing", addr))
        .submit(Submission::new(SessionId::generate(), "X"))
        .await
        .unwrap_err();

    assert_eq!(err, SubmitError::Status(404));
    assert!(state.last().await.is_none());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    // Bind and drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = submitter(&format!("http://{}", addr))
        .submit(Submission::new(SessionId::generate(), "X"))
        .await
        .unwrap_err();

    assert!(matches!(err, SubmitError::Transport(_)));
}
