// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera controller
//!
//! Two layers are kept apart:
//!
//! - [`SessionError`] is what a native session backend reports.
//! - [`CameraException`] is the public taxonomy callers see in
//!   [`CameraState::Error`](crate::state::CameraState) and in the error arms
//!   of capture and recording results.
//!
//! Causes are shared behind an `Arc` so exceptions stay cheap to clone into
//! every state subscriber.

use std::fmt;
use std::sync::Arc;

/// Underlying cause attached to a [`CameraException`]
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for native session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Camera-level failure reported to callers
#[derive(Debug, Clone)]
pub enum CameraException {
    /// Camera permission was not granted
    PermissionDenied,
    /// No camera device is available for the requested lens
    NoCameraAvailable,
    /// The native session could not be brought up
    InitializationFailed(Option<ErrorCause>),
    /// A still capture or a reconfiguration failed
    CaptureFailed(Option<ErrorCause>),
    /// Video recording failed
    RecordingFailed(Option<ErrorCause>),
    /// Anything else
    Unknown {
        message: String,
        cause: Option<ErrorCause>,
    },
}

impl CameraException {
    pub fn initialization_failed(cause: impl Into<SessionError>) -> Self {
        Self::InitializationFailed(Some(Arc::new(cause.into())))
    }

    pub fn capture_failed(cause: impl Into<SessionError>) -> Self {
        Self::CaptureFailed(Some(Arc::new(cause.into())))
    }

    pub fn recording_failed(cause: impl Into<SessionError>) -> Self {
        Self::RecordingFailed(Some(Arc::new(cause.into())))
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            cause: None,
        }
    }

    /// Map a failure of `bind` into the exception published by `initialize`
    pub fn from_bind_failure(error: SessionError) -> Self {
        match error {
            SessionError::PermissionDenied => Self::PermissionDenied,
            SessionError::DeviceNotFound(_) => Self::NoCameraAvailable,
            other => Self::initialization_failed(other),
        }
    }

    /// Map an asynchronous failure of a running session
    pub fn from_runtime_failure(error: SessionError) -> Self {
        match error {
            SessionError::PermissionDenied => Self::PermissionDenied,
            SessionError::DeviceNotFound(_) => Self::NoCameraAvailable,
            other => Self::Unknown {
                message: "Camera session failed".to_string(),
                cause: Some(Arc::new(other)),
            },
        }
    }

    /// The underlying cause, if one was recorded
    pub fn cause(&self) -> Option<&ErrorCause> {
        match self {
            Self::PermissionDenied | Self::NoCameraAvailable => None,
            Self::InitializationFailed(cause)
            | Self::CaptureFailed(cause)
            | Self::RecordingFailed(cause) => cause.as_ref(),
            Self::Unknown { cause, .. } => cause.as_ref(),
        }
    }

    /// Short message without the cause chain
    pub fn message(&self) -> &str {
        match self {
            Self::PermissionDenied => "Camera permission denied",
            Self::NoCameraAvailable => "No camera device available",
            Self::InitializationFailed(_) => "Camera initialization failed",
            Self::CaptureFailed(_) => "Image capture failed",
            Self::RecordingFailed(_) => "Video recording failed",
            Self::Unknown { message, .. } => message,
        }
    }
}

impl fmt::Display for CameraException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause() {
            Some(cause) => write!(f, "{}: {}", self.message(), cause),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for CameraException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause()
            .map(|cause| cause.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Errors reported by a native session backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The OS refused access to the device
    PermissionDenied,
    /// No device for the requested lens
    DeviceNotFound(String),
    /// The backend could not start
    InitializationFailed(String),
    /// Operation requires a bound session
    NotReady,
    /// Another operation holds the resource
    Busy(String),
    /// A recording is already running
    RecordingInProgress,
    /// No recording to stop
    NoRecordingInProgress,
    /// The backend cannot do this
    Unsupported(String),
    /// The controller was released while the operation was in flight
    Cancelled,
    /// The device went away while running
    Disconnected(String),
    /// Filesystem or device I/O failure
    Io(String),
    /// Encoding of a captured frame failed
    Encoding(String),
    /// Other errors
    Other(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PermissionDenied => write!(f, "Access to the camera was denied"),
            SessionError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            SessionError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            SessionError::NotReady => write!(f, "Camera session is not ready"),
            SessionError::Busy(msg) => write!(f, "Camera is busy: {}", msg),
            SessionError::RecordingInProgress => write!(f, "Recording already in progress"),
            SessionError::NoRecordingInProgress => write!(f, "No recording in progress"),
            SessionError::Unsupported(msg) => write!(f, "Not supported: {}", msg),
            SessionError::Cancelled => write!(f, "Operation cancelled by release"),
            SessionError::Disconnected(msg) => write!(f, "Camera disconnected: {}", msg),
            SessionError::Io(msg) => write!(f, "I/O error: {}", msg),
            SessionError::Encoding(msg) => write!(f, "Encoding failed: {}", msg),
            SessionError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => SessionError::PermissionDenied,
            _ => SessionError::Io(err.to_string()),
        }
    }
}

impl From<image::ImageError> for SessionError {
    fn from(err: image::ImageError) -> Self {
        SessionError::Encoding(err.to_string())
    }
}

/// Errors while loading or saving [`Settings`](crate::config::Settings)
#[derive(Debug)]
pub enum SettingsError {
    /// Reading or writing the settings file failed
    Io(std::io::Error),
    /// The settings file is not valid JSON for this version
    Parse(serde_json::Error),
    /// No configuration directory on this platform
    NoConfigDir,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "Settings I/O error: {}", e),
            SettingsError::Parse(e) => write!(f, "Invalid settings file: {}", e),
            SettingsError::NoConfigDir => write!(f, "No configuration directory available"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Io(e) => Some(e),
            SettingsError::Parse(e) => Some(e),
            SettingsError::NoConfigDir => None,
        }
    }
}

impl From<std::io::Error> for SettingsError {
    fn from(err: std::io::Error) -> Self {
        SettingsError::Io(err)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::Parse(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_bind_failure_mapping() {
        assert!(matches!(
            CameraException::from_bind_failure(SessionError::PermissionDenied),
            CameraException::PermissionDenied
        ));
        assert!(matches!(
            CameraException::from_bind_failure(SessionError::DeviceNotFound("front".into())),
            CameraException::NoCameraAvailable
        ));
        assert!(matches!(
            CameraException::from_bind_failure(SessionError::Other("boom".into())),
            CameraException::InitializationFailed(Some(_))
        ));
    }

    #[test]
    fn test_display_includes_cause() {
        let err = CameraException::capture_failed(SessionError::Busy("capture in flight".into()));
        assert_eq!(
            err.to_string(),
            "Image capture failed: Camera is busy: capture in flight"
        );
        assert!(err.source().is_some());

        let plain = CameraException::NoCameraAvailable;
        assert_eq!(plain.to_string(), "No camera device available");
        assert!(plain.source().is_none());
    }

    #[test]
    fn test_io_error_conversion() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(SessionError::from(denied), SessionError::PermissionDenied);

        let other = std::io::Error::other("disk full");
        assert!(matches!(SessionError::from(other), SessionError::Io(_)));
    }
}
