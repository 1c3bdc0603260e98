// SPDX-License-Identifier: GPL-3.0-only

//! Camera state machine and its broadcast publisher
//!
//! The controller is the only writer. Readers hold a `watch::Receiver` and
//! always see the most recent complete value; a new subscriber observes the
//! current state immediately.

use crate::config::CameraLens;
use crate::errors::CameraException;
use crate::flash::FlashMode;
use futures::Stream;
use tokio::sync::watch;
use tracing::debug;

/// Configuration actually applied to the live session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadyState {
    pub current_lens: CameraLens,
    pub flash_mode: FlashMode,
    pub is_recording: bool,
    /// Always >= 0
    pub zoom_ratio: f32,
}

/// Lifecycle state of one controller
#[derive(Debug, Clone, Default)]
pub enum CameraState {
    /// Waiting for `initialize()`; only ever the first state
    #[default]
    Initializing,
    /// Session bound and usable
    Ready(ReadyState),
    /// Unusable; a new controller must be constructed
    Error(CameraException),
}

impl CameraState {
    pub fn is_initializing(&self) -> bool {
        matches!(self, CameraState::Initializing)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CameraState::Ready(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CameraState::Error(_))
    }

    pub fn ready(&self) -> Option<&ReadyState> {
        match self {
            CameraState::Ready(ready) => Some(ready),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CameraException> {
        match self {
            CameraState::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            CameraState::Initializing => "Initializing",
            CameraState::Ready(_) => "Ready",
            CameraState::Error(_) => "Error",
        }
    }
}

/// Single-writer side of the state stream
#[derive(Debug)]
pub struct StatePublisher {
    sender: watch::Sender<CameraState>,
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePublisher {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(CameraState::Initializing);
        Self { sender }
    }

    /// Replace the whole state
    pub fn publish(&self, state: CameraState) {
        debug!(state = state.name(), "Camera state changed");
        self.sender.send_replace(state);
    }

    /// Move `Initializing` to `Ready`; false if the state already moved on
    pub fn enter_ready(&self, ready: ReadyState) -> bool {
        let entered = self.sender.send_if_modified(|state| {
            if state.is_initializing() {
                *state = CameraState::Ready(ready);
                true
            } else {
                false
            }
        });
        if entered {
            debug!(state = "Ready", "Camera state changed");
        }
        entered
    }

    /// Move to `Error` unless already failed; the first error sticks
    pub fn fail(&self, error: CameraException) -> bool {
        let failed = self.sender.send_if_modified(|state| {
            if state.is_error() {
                false
            } else {
                *state = CameraState::Error(error);
                true
            }
        });
        if failed {
            debug!(state = "Error", "Camera state changed");
        }
        failed
    }

    /// Apply `update` to the Ready payload
    ///
    /// Returns false and notifies nobody when the state is not Ready or the
    /// update left it unchanged.
    pub fn update_ready(&self, update: impl FnOnce(&mut ReadyState)) -> bool {
        self.sender.send_if_modified(|state| match state {
            CameraState::Ready(ready) => {
                let before = *ready;
                update(ready);
                *ready != before
            }
            _ => false,
        })
    }

    pub fn current(&self) -> CameraState {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CameraState> {
        self.sender.subscribe()
    }
}

/// Adapt a state receiver into a `Stream` that yields the current value
/// first, then every change until the publisher goes away
pub fn state_stream(mut receiver: watch::Receiver<CameraState>) -> impl Stream<Item = CameraState> {
    async_stream::stream! {
        let current = receiver.borrow_and_update().clone();
        yield current;
        while receiver.changed().await.is_ok() {
            let next = receiver.borrow_and_update().clone();
            yield next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn ready() -> CameraState {
        CameraState::Ready(ReadyState {
            current_lens: CameraLens::Back,
            flash_mode: FlashMode::Off,
            is_recording: false,
            zoom_ratio: 1.0,
        })
    }

    #[test]
    fn test_update_ready_ignored_outside_ready() {
        let publisher = StatePublisher::new();
        assert!(!publisher.update_ready(|r| r.is_recording = true));
        assert!(publisher.current().is_initializing());
    }

    #[test]
    fn test_update_ready_skips_noop() {
        let publisher = StatePublisher::new();
        publisher.publish(ready());
        let mut rx = publisher.subscribe();
        rx.borrow_and_update();

        assert!(!publisher.update_ready(|r| r.zoom_ratio = 1.0));
        assert!(!rx.has_changed().unwrap());

        assert!(publisher.update_ready(|r| r.flash_mode = FlashMode::Torch));
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow().ready().map(|r| r.flash_mode),
            Some(FlashMode::Torch)
        );
    }

    #[test]
    fn test_error_is_terminal() {
        let publisher = StatePublisher::new();
        assert!(publisher.fail(CameraException::NoCameraAvailable));
        assert!(!publisher.enter_ready(ReadyState {
            current_lens: CameraLens::Back,
            flash_mode: FlashMode::Off,
            is_recording: false,
            zoom_ratio: 1.0,
        }));
        assert!(!publisher.fail(CameraException::PermissionDenied));
        assert!(matches!(
            publisher.current().error(),
            Some(CameraException::NoCameraAvailable)
        ));
    }

    #[tokio::test]
    async fn test_stream_yields_current_first() {
        let publisher = StatePublisher::new();
        let stream = state_stream(publisher.subscribe());
        tokio::pin!(stream);

        assert!(stream.next().await.unwrap().is_initializing());
        publisher.publish(ready());
        assert!(stream.next().await.unwrap().is_ready());
        drop(publisher);
        assert!(stream.next().await.is_none());
    }
}
