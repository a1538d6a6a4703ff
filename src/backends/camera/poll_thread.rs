// SPDX-License-Identifier: GPL-3.0-only
//! Background thread lifecycle for blocking poll loops
//!
//! Capture backends need a plain OS thread for work that blocks (polling a
//! GStreamer bus, pacing a replayed image stream). This module gives those
//! threads a uniform start/stop/join contract so releasing a camera always
//! tears them down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the poll callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// A poll loop running on its own thread
///
/// The callback must return within a bounded time (use timed waits) so the
/// stop signal is observed promptly.
pub struct PollThread {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl PollThread {
    /// Start calling `poll_fn` repeatedly on a new thread until it returns
    /// [`LoopAction::Stop`] or [`PollThread::stop`] is called.
    pub fn start<F>(name: &str, mut poll_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting poll thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Poll thread started");

                while !stop_signal_clone.load(Ordering::SeqCst) {
                    if poll_fn() == LoopAction::Stop {
                        debug!(name = %name_clone, "Poll loop requested stop");
                        break;
                    }
                }

                debug!(name = %name_clone, "Poll thread exiting");
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn poll thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop and wait for the thread to finish
    ///
    /// Calling this more than once is harmless.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            // A poll callback may end up stopping its own owner; never self-join
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Poll thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Poll thread finished");
            }
        }
    }
}

impl Drop for PollThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "PollThread dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut poller = PollThread::start("test-loop", move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count >= 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        while poller.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        poller.stop();

        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut poller = PollThread::start("test-stop", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        });

        thread::sleep(Duration::from_millis(30));
        poller.stop();
        poller.stop();

        assert!(!poller.is_running());
        assert!(counter.load(Ordering::SeqCst) > 0);
    }
}
