// SPDX-License-Identifier: GPL-3.0-only

//! Latest-frame-wins dispatch from the frame path to a detector
//!
//! The listener registered by [`FrameAnalyzer::attach`] runs on the
//! frame-producing thread and only does three things: test-and-set the busy
//! bit, clone the frame handle, and hand it to the blocking pool. While a
//! detection is in flight every new frame is dropped for this analyzer;
//! nothing is queued.
//!
//! Each attachment gets a new epoch. A detection publishes only if its epoch
//! is still the active one, checked under the same lock `detach` takes, so
//! no result lands after `detach` returns.

use crate::backends::camera::CameraFrame;
use crate::controller::{CameraController, FrameListener, FrameListenerRegistry};
use crate::plugins::{DetectionStream, DetectorError};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Per-frame analysis: `Ok(value)` replaces the published value
pub type AnalyzeFn<T> = dyn Fn(&CameraFrame) -> Result<T, DetectorError> + Send + Sync;

struct Shared<T> {
    name: String,
    sender: watch::Sender<T>,
    busy: AtomicBool,
    dropped: AtomicU64,
    analyzed: AtomicU64,
    /// Epoch of the live attachment, `None` while detached
    active_epoch: Mutex<Option<u64>>,
    next_epoch: AtomicU64,
}

struct Attachment {
    registry: Weak<FrameListenerRegistry>,
    listener: Arc<dyn FrameListener>,
}

/// Owns a detection stream and feeds it from attached controllers
pub struct FrameAnalyzer<T> {
    shared: Arc<Shared<T>>,
    analyze: Arc<AnalyzeFn<T>>,
    attachment: Mutex<Option<Attachment>>,
}

impl<T> FrameAnalyzer<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, initial: T, analyze: Arc<AnalyzeFn<T>>) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                sender,
                busy: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
                analyzed: AtomicU64::new(0),
                active_epoch: Mutex::new(None),
                next_epoch: AtomicU64::new(1),
            }),
            analyze,
            attachment: Mutex::new(None),
        }
    }

    pub fn stream(&self) -> DetectionStream<T> {
        DetectionStream::new(self.shared.sender.subscribe())
    }

    pub fn current(&self) -> T {
        self.shared.sender.borrow().clone()
    }

    /// Frames skipped because a detection was still running
    pub fn frames_dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Frames that went through the detector
    pub fn frames_analyzed(&self) -> u64 {
        self.shared.analyzed.load(Ordering::Relaxed)
    }

    pub fn is_attached(&self) -> bool {
        self.attachment_lock().is_some()
    }

    /// Register this analyzer's listener with `controller`
    ///
    /// Attaching while already attached moves the analyzer to the new
    /// controller.
    pub fn attach(&self, controller: &dyn CameraController) {
        if self.is_attached() {
            warn!(plugin = %self.shared.name, "Plugin attached twice, detaching first");
            self.detach();
        }

        let epoch = self.shared.next_epoch.fetch_add(1, Ordering::SeqCst);
        *self.shared.epoch_lock() = Some(epoch);

        let runtime = tokio::runtime::Handle::try_current().ok();
        let listener: Arc<dyn FrameListener> = Arc::new(AnalyzerListener {
            shared: Arc::clone(&self.shared),
            analyze: Arc::clone(&self.analyze),
            epoch,
            runtime,
        });

        let registry = controller.frame_listeners();
        registry.add(Arc::clone(&listener));
        *self.attachment_lock() = Some(Attachment {
            registry: Arc::downgrade(&registry),
            listener,
        });
        debug!(plugin = %self.shared.name, epoch, "Plugin attached");
    }

    /// Unregister the listener and stop publishing; returns false if not attached
    pub fn detach(&self) -> bool {
        let Some(attachment) = self.attachment_lock().take() else {
            return false;
        };
        *self.shared.epoch_lock() = None;
        if let Some(registry) = attachment.registry.upgrade() {
            registry.remove(&attachment.listener);
        }
        debug!(plugin = %self.shared.name, "Plugin detached");
        true
    }

    fn attachment_lock(&self) -> MutexGuard<'_, Option<Attachment>> {
        self.attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Shared<T> {
    fn epoch_lock(&self) -> MutexGuard<'_, Option<u64>> {
        self.active_epoch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct AnalyzerListener<T> {
    shared: Arc<Shared<T>>,
    analyze: Arc<AnalyzeFn<T>>,
    epoch: u64,
    runtime: Option<tokio::runtime::Handle>,
}

/// Clears the busy bit however the detection ends
struct BusyGuard<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Drop for BusyGuard<T> {
    fn drop(&mut self) {
        self.shared.busy.store(false, Ordering::Release);
    }
}

impl<T> FrameListener for AnalyzerListener<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn on_frame(&self, frame: &CameraFrame) {
        if self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(plugin = %self.shared.name, sequence = frame.sequence, dropped, "Detector busy, dropping frame");
            return;
        }

        let guard = BusyGuard {
            shared: Arc::clone(&self.shared),
        };
        let analyze = Arc::clone(&self.analyze);
        let epoch = self.epoch;
        let frame = frame.clone();
        let job = move || {
            run_detection(&guard.shared, analyze.as_ref(), epoch, &frame);
            drop(guard);
        };

        match &self.runtime {
            Some(handle) => {
                handle.spawn_blocking(job);
            }
            None => {
                if let Err(e) = std::thread::Builder::new()
                    .name("frame-analyzer".to_string())
                    .spawn(job)
                {
                    // The job (and its guard) was dropped, so the busy bit is clear again
                    warn!(plugin = %self.shared.name, error = %e, "Failed to spawn detection thread");
                }
            }
        }
    }
}

fn run_detection<T>(shared: &Shared<T>, analyze: &AnalyzeFn<T>, epoch: u64, frame: &CameraFrame)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    if *shared.epoch_lock() != Some(epoch) {
        return;
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| analyze(frame)));
    shared.analyzed.fetch_add(1, Ordering::Relaxed);

    let value = match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            debug!(plugin = %shared.name, sequence = frame.sequence, error = %e, "Detector failed on frame");
            return;
        }
        Err(_) => {
            warn!(plugin = %shared.name, sequence = frame.sequence, "Detector panicked on frame");
            return;
        }
    };

    let active = shared.epoch_lock();
    if *active != Some(epoch) {
        trace!(plugin = %shared.name, "Discarding detection that finished after detach");
        return;
    }
    shared.sender.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
    drop(active);
}
