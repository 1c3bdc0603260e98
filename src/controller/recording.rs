// SPDX-License-Identifier: GPL-3.0-only

//! Live recording handle

use crate::errors::{CameraException, SessionError};
use crate::pipelines::VideoRecordingResult;
use async_trait::async_trait;
use std::sync::Weak;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

/// Controller side of a recording handle
#[async_trait]
pub(crate) trait RecordingControl: Send + Sync + 'static {
    async fn stop_recording(&self, id: Uuid) -> VideoRecordingResult;
}

/// An active recording
///
/// Obtained from
/// [`CameraController::start_recording`](super::CameraController::start_recording).
/// `stop` consumes the handle, so a recording cannot be restarted. Dropping
/// the handle without stopping finalizes the recording in the background.
pub struct VideoRecording {
    id: Uuid,
    started_at: Instant,
    control: Option<Weak<dyn RecordingControl>>,
}

impl VideoRecording {
    pub(crate) fn new(id: Uuid, started_at: Instant, control: Weak<dyn RecordingControl>) -> Self {
        Self {
            id,
            started_at,
            control: Some(control),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop recording and finalize the output
    pub async fn stop(mut self) -> VideoRecordingResult {
        let control = self.control.take().and_then(|weak| weak.upgrade());
        match control {
            Some(control) => control.stop_recording(self.id).await,
            None => VideoRecordingResult::Error(CameraException::recording_failed(
                SessionError::Cancelled,
            )),
        }
    }
}

impl Drop for VideoRecording {
    fn drop(&mut self) {
        let Some(control) = self.control.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%id, "Recording handle dropped without stop, finalizing in background");
                handle.spawn(async move {
                    control.stop_recording(id).await;
                });
            }
            Err(_) => {
                warn!(%id, "Recording handle dropped outside a runtime, it stops on release");
            }
        }
    }
}

impl std::fmt::Debug for VideoRecording {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoRecording")
            .field("id", &self.id)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}
