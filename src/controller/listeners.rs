// SPDX-License-Identifier: GPL-3.0-only

//! Frame listener registry
//!
//! Listeners are invoked synchronously on the frame-producing thread, once
//! per frame, in registration order. They must return quickly; anything
//! heavier belongs on the blocking pool (see
//! [`FrameAnalyzer`](crate::plugins::FrameAnalyzer)).

use crate::backends::camera::CameraFrame;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Callback invoked once per delivered frame
pub trait FrameListener: Send + Sync {
    fn on_frame(&self, frame: &CameraFrame);
}

impl<F> FrameListener for F
where
    F: Fn(&CameraFrame) + Send + Sync,
{
    fn on_frame(&self, frame: &CameraFrame) {
        self(frame)
    }
}

/// Ordered set of listeners, unique by identity
#[derive(Default)]
pub struct FrameListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn FrameListener>>>,
    delivered: AtomicU64,
}

impl FrameListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; registering the same instance twice is a no-op
    pub fn add(&self, listener: Arc<dyn FrameListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Unregister `listener`; returns false when it was not registered
    pub fn remove(&self, listener: &Arc<dyn FrameListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames dispatched since creation
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Invoke every listener with `frame`
    ///
    /// Runs over a snapshot so listeners may add or remove listeners from
    /// inside the callback. A panicking listener is logged and skipped.
    pub fn dispatch(&self, frame: &CameraFrame) {
        let snapshot: Vec<Arc<dyn FrameListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.delivered.fetch_add(1, Ordering::Relaxed);

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener.on_frame(frame))).is_err() {
                warn!(sequence = frame.sequence, "Frame listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for FrameListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameListenerRegistry")
            .field("listeners", &self.len())
            .field("delivered", &self.delivered())
            .finish()
    }
}

fn same_listener(a: &Arc<dyn FrameListener>, b: &Arc<dyn FrameListener>) -> bool {
    // Compare data pointers only; vtables may differ across codegen units
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::PixelFormat;

    fn frame() -> CameraFrame {
        CameraFrame::new(1, 1, 1, PixelFormat::Gray, vec![0u8]).unwrap()
    }

    #[test]
    fn test_add_is_unique_by_identity() {
        let registry = FrameListenerRegistry::new();
        let listener: Arc<dyn FrameListener> = Arc::new(|_: &CameraFrame| {});
        assert!(registry.add(Arc::clone(&listener)));
        assert!(!registry.add(Arc::clone(&listener)));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&listener));
        assert!(!registry.remove(&listener));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_panicking_listener_does_not_stop_dispatch() {
        let registry = FrameListenerRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);

        registry.add(Arc::new(|_: &CameraFrame| panic!("listener failure")));
        registry.add(Arc::new(move |_: &CameraFrame| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.dispatch(&frame());
        registry.dispatch(&frame());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(registry.delivered(), 2);
    }
}
