// SPDX-License-Identifier: GPL-3.0-only

//! Scripted fakes shared by the integration tests

#![allow(dead_code)]

use futures::FutureExt;
use futures::future::BoxFuture;
use qrlink::backends::camera::{
    BackendError, BackendResult, CameraBackend, CameraBackendType, CameraFrame, CameraHandle,
    CameraRequest, CameraStream, FaultSender, FramePublisher, frame_channel,
};
use qrlink::errors::ScanResult;
use qrlink::scanner::{
    ControllerSettings, Decoder, LifecycleController, ScanLoop, StatusReporter,
};
use qrlink::session::SessionId;
use qrlink::submit::{Submission, SubmitError, SubmitResult, Submitter};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FRAME_INTERVAL: Duration = Duration::from_millis(5);

/// Poll a condition until it holds or two seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub fn white_frame() -> CameraFrame {
    CameraFrame::from_rgba(8, 8, vec![255; 8 * 8 * 4])
}

struct FakeStream {
    releases: Arc<AtomicUsize>,
}

impl CameraStream for FakeStream {
    fn stop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Camera backend with scripted availability, failures and frames
pub struct FakeBackend {
    available: AtomicBool,
    failure: Mutex<Option<BackendError>>,
    first_frame: Mutex<Option<CameraFrame>>,
    startup_fault: Mutex<Option<BackendError>>,
    acquisitions: AtomicUsize,
    releases: Arc<AtomicUsize>,
    live: Mutex<Option<(FramePublisher, FaultSender)>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(true),
            failure: Mutex::new(None),
            first_frame: Mutex::new(Some(white_frame())),
            startup_fault: Mutex::new(None),
            acquisitions: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
            live: Mutex::new(None),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next acquisitions fail
    pub fn fail_with(&self, err: Option<BackendError>) {
        *self.failure.lock().unwrap() = err;
    }

    /// Acquire successfully but never deliver a frame
    pub fn without_frames(&self) {
        *self.first_frame.lock().unwrap() = None;
    }

    /// Report a stream fault right after acquisition, before any frame
    pub fn fault_on_start(&self, fault: BackendError) {
        *self.first_frame.lock().unwrap() = None;
        *self.startup_fault.lock().unwrap() = Some(fault);
    }

    pub fn publish(&self, frame: CameraFrame) {
        if let Some((publisher, _)) = self.live.lock().unwrap().as_ref() {
            publisher.publish(frame);
        }
    }

    /// Report a stream fault on the live camera
    pub fn fault(&self, reason: &str) -> bool {
        match self.live.lock().unwrap().as_ref() {
            Some((_, faults)) => faults.send(BackendError::Stream(reason.to_string())).is_ok(),
            None => false,
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl CameraBackend for FakeBackend {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::PipeWire
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn acquire(&self, _request: &CameraRequest) -> BackendResult<CameraHandle> {
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        let (publisher, _) = frame_channel();
        let (fault_tx, fault_rx) = tokio::sync::mpsc::unbounded_channel();
        if let Some(frame) = self.first_frame.lock().unwrap().clone() {
            publisher.publish(frame);
        }
        if let Some(fault) = self.startup_fault.lock().unwrap().clone() {
            let _ = fault_tx.send(fault);
        }
        *self.live.lock().unwrap() = Some((publisher.clone(), fault_tx));

        Ok(CameraHandle::new(
            "fake camera",
            Box::new(FakeStream {
                releases: Arc::clone(&self.releases),
            }),
            publisher,
            fault_rx,
        ))
    }
}

/// Decoder returning scripted results, then `None` forever
#[derive(Default)]
pub struct ScriptedDecoder {
    script: Mutex<VecDeque<ScanResult<Option<String>>>>,
    calls: AtomicUsize,
}

impl ScriptedDecoder {
    pub fn new(script: impl IntoIterator<Item = ScanResult<Option<String>>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Script plain values
    pub fn values(values: &[&str]) -> Arc<Self> {
        Self::new(values.iter().map(|v| Ok(Some(v.to_string()))))
    }

    pub fn push(&self, result: ScanResult<Option<String>>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(&self, _pixels: &[u8], _width: u32, _height: u32) -> ScanResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

/// Submitter that records every submission and answers with a fixed result
pub struct RecordingSubmitter {
    submissions: Mutex<Vec<Submission>>,
    response: Mutex<SubmitResult>,
}

impl RecordingSubmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            response: Mutex::new(Ok(serde_json::json!({"status": "success"}))),
        })
    }

    pub fn failing(err: SubmitError) -> Arc<Self> {
        let submitter = Self::new();
        *submitter.response.lock().unwrap() = Err(err);
        submitter
    }

    pub fn values(&self) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.qr_url.clone())
            .collect()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

impl Submitter for RecordingSubmitter {
    fn submit(&self, submission: Submission) -> BoxFuture<'static, SubmitResult> {
        self.submissions.lock().unwrap().push(submission);
        let response = self.response.lock().unwrap().clone();
        async move { response }.boxed()
    }
}

/// Fakes wired together
pub struct Rig {
    pub backend: Arc<FakeBackend>,
    pub decoder: Arc<ScriptedDecoder>,
    pub submitter: Arc<RecordingSubmitter>,
    pub reporter: StatusReporter,
    pub session: SessionId,
}

impl Rig {
    pub fn new(decoder: Arc<ScriptedDecoder>, submitter: Arc<RecordingSubmitter>) -> Self {
        Self {
            backend: FakeBackend::new(),
            decoder,
            submitter,
            reporter: StatusReporter::new(),
            session: SessionId::from_string("user_testrig01"),
        }
    }

    pub fn scan_loop(&self) -> ScanLoop {
        ScanLoop::new(
            self.decoder.clone(),
            self.submitter.clone(),
            self.session.clone(),
            self.reporter.clone(),
        )
        .with_frame_interval(FRAME_INTERVAL)
    }

    pub fn controller(&self) -> LifecycleController {
        self.controller_with_warmup(Duration::from_millis(200))
    }

    pub fn controller_with_warmup(&self, warmup_timeout: Duration) -> LifecycleController {
        LifecycleController::new(
            self.backend.clone(),
            self.scan_loop(),
            self.reporter.clone(),
            ControllerSettings {
                warmup_timeout,
                ..ControllerSettings::default()
            },
        )
    }
}
