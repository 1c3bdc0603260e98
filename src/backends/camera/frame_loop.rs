// SPDX-License-Identifier: GPL-3.0-only

//! Paced frame loop threads
//!
//! Sessions that produce frames themselves (synthetic sources, polled
//! devices) run one loop thread per bound session. The loop body is called
//! once per tick at the target frame rate until it returns
//! [`LoopAction::Stop`] or the loop is stopped from outside.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the loop body to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Handle to a loop running in its own thread
///
/// Dropping the handle stops the loop and joins the thread.
pub struct FrameLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl FrameLoop {
    /// Start calling `tick(sequence)` at `fps` ticks per second
    ///
    /// Sequence numbers start at 1. If the body overruns its slot the next
    /// tick starts immediately rather than bursting to catch up.
    pub fn start<F>(name: &str, fps: u32, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut(u64) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();
        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

        info!(name = %name, fps, "Starting frame loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut sequence = 0u64;
                let mut next_deadline = Instant::now();

                loop {
                    if thread_stop.load(Ordering::SeqCst) {
                        debug!(name = %thread_name, "Stop signal received");
                        break;
                    }

                    sequence += 1;
                    if tick(sequence) == LoopAction::Stop {
                        debug!(name = %thread_name, sequence, "Loop requested stop");
                        break;
                    }

                    next_deadline += interval;
                    let now = Instant::now();
                    if next_deadline > now {
                        thread::sleep(next_deadline - now);
                    } else {
                        next_deadline = now;
                    }
                }

                info!(name = %thread_name, frames = sequence, "Frame loop thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    ///
    /// Called from inside the loop body this only signals; joining our own
    /// thread would deadlock.
    pub fn stop(&mut self) {
        self.request_stop();
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            debug!(name = %self.name, "Stop requested from loop thread, not joining");
            return;
        }
        if handle.join().is_err() {
            warn!(name = %self.name, "Frame loop thread panicked");
        } else {
            debug!(name = %self.name, "Frame loop thread finished");
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
