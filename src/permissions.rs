// SPDX-License-Identifier: GPL-3.0-only

//! Camera permission model and request protocol
//!
//! [`PermissionManager`] implements the policy on top of a platform
//! [`PermissionBackend`]:
//!
//! - an already granted permission is returned without prompting
//! - a permission the platform will not prompt for again resolves to
//!   `Denied` immediately instead of waiting on a prompt that never shows
//!
//! [`DevicePermissionBackend`] is the desktop backend. Desktop systems grant
//! camera access through device node permissions rather than a runtime
//! prompt, so it inspects `/dev` and never prompts.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Permissions a camera application may need
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CameraPermission {
    /// Camera access for preview and capture
    Camera,
    /// Microphone access for recording with audio
    Microphone,
    /// Storage access for saving photos and videos
    Storage,
}

impl CameraPermission {
    pub fn name(&self) -> &'static str {
        match self {
            CameraPermission::Camera => "Camera",
            CameraPermission::Microphone => "Microphone",
            CameraPermission::Storage => "Storage",
        }
    }
}

/// Tri-state permission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Never asked
    NotDetermined,
}

/// Statuses of a bundle of requested permissions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionResult {
    permissions: BTreeMap<CameraPermission, PermissionStatus>,
}

impl PermissionResult {
    pub fn new(permissions: impl IntoIterator<Item = (CameraPermission, PermissionStatus)>) -> Self {
        Self {
            permissions: permissions.into_iter().collect(),
        }
    }

    pub fn permissions(&self) -> &BTreeMap<CameraPermission, PermissionStatus> {
        &self.permissions
    }

    pub fn status(&self, permission: CameraPermission) -> Option<PermissionStatus> {
        self.permissions.get(&permission).copied()
    }

    /// True iff every requested permission is granted (vacuously true when empty)
    pub fn all_granted(&self) -> bool {
        self.permissions
            .values()
            .all(|status| *status == PermissionStatus::Granted)
    }

    pub fn camera_granted(&self) -> bool {
        self.status(CameraPermission::Camera) == Some(PermissionStatus::Granted)
    }

    pub fn microphone_granted(&self) -> bool {
        self.status(CameraPermission::Microphone) == Some(PermissionStatus::Granted)
    }
}

/// OS-level permission primitives
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Current status without prompting; must not block
    fn status(&self, permission: CameraPermission) -> PermissionStatus;

    /// Whether asking again would show a prompt
    ///
    /// False once the user suppressed re-prompting, and on platforms that
    /// have no runtime prompt at all.
    fn can_prompt(&self, permission: CameraPermission) -> bool;

    /// Show the prompt and wait for the user's answer
    async fn prompt(&self, permission: CameraPermission) -> PermissionStatus;

    /// Navigate to the system settings page for this application
    fn open_settings(&self) -> io::Result<()>;
}

/// Request protocol shared by every platform
#[derive(Clone)]
pub struct PermissionManager {
    backend: Arc<dyn PermissionBackend>,
}

impl PermissionManager {
    pub fn new(backend: Arc<dyn PermissionBackend>) -> Self {
        Self { backend }
    }

    /// Manager over the desktop device-node backend
    pub fn for_desktop(settings: &crate::config::Settings) -> Self {
        Self::new(Arc::new(DevicePermissionBackend::from_settings(settings)))
    }

    /// Query without prompting
    pub fn check_permission(&self, permission: CameraPermission) -> PermissionStatus {
        self.backend.status(permission)
    }

    /// Resolve `permission`, prompting only when that can make progress
    pub async fn request_permission(&self, permission: CameraPermission) -> PermissionStatus {
        let current = self.backend.status(permission);
        if current == PermissionStatus::Granted {
            debug!(permission = permission.name(), "Permission already granted");
            return PermissionStatus::Granted;
        }

        if !self.backend.can_prompt(permission) {
            info!(
                permission = permission.name(),
                status = ?current,
                "Permission cannot be prompted for, app settings are the only path"
            );
            return PermissionStatus::Denied;
        }

        match self.backend.prompt(permission).await {
            PermissionStatus::Granted => {
                info!(permission = permission.name(), "Permission granted");
                PermissionStatus::Granted
            }
            status => {
                info!(permission = permission.name(), answer = ?status, "Permission not granted");
                PermissionStatus::Denied
            }
        }
    }

    /// Request camera and microphone, in that order
    pub async fn request_camera_permissions(&self) -> PermissionResult {
        let mut permissions = BTreeMap::new();
        for permission in [CameraPermission::Camera, CameraPermission::Microphone] {
            let status = self.request_permission(permission).await;
            permissions.insert(permission, status);
        }
        PermissionResult { permissions }
    }

    /// Open the system settings page; failures are logged
    pub fn open_app_settings(&self) {
        match self.backend.open_settings() {
            Ok(()) => info!("Opened app settings"),
            Err(e) => warn!(error = %e, "Failed to open app settings"),
        }
    }
}

impl std::fmt::Debug for PermissionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionManager").finish_non_exhaustive()
    }
}

/// Desktop backend reading device node access
#[derive(Debug, Clone)]
pub struct DevicePermissionBackend {
    dev_root: PathBuf,
    storage_dir: PathBuf,
    settings_uri: Option<String>,
}

impl DevicePermissionBackend {
    pub fn new(dev_root: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
            storage_dir: storage_dir.into(),
            settings_uri: default_settings_uri().map(str::to_string),
        }
    }

    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        let mut backend = Self::new("/dev", settings.photo_dir());
        if let Some(uri) = &settings.app_settings_uri {
            backend.settings_uri = Some(uri.clone());
        }
        backend
    }

    pub fn with_settings_uri(mut self, uri: Option<String>) -> Self {
        self.settings_uri = uri;
        self
    }

    fn camera_status(&self) -> PermissionStatus {
        device_status(&self.dev_root, "video")
    }

    fn microphone_status(&self) -> PermissionStatus {
        device_status(&self.dev_root.join("snd"), "controlC")
    }

    fn storage_status(&self) -> PermissionStatus {
        storage_status(&self.storage_dir)
    }
}

#[async_trait]
impl PermissionBackend for DevicePermissionBackend {
    fn status(&self, permission: CameraPermission) -> PermissionStatus {
        match permission {
            CameraPermission::Camera => self.camera_status(),
            CameraPermission::Microphone => self.microphone_status(),
            CameraPermission::Storage => self.storage_status(),
        }
    }

    fn can_prompt(&self, _permission: CameraPermission) -> bool {
        false
    }

    async fn prompt(&self, permission: CameraPermission) -> PermissionStatus {
        self.status(permission)
    }

    fn open_settings(&self) -> io::Result<()> {
        match &self.settings_uri {
            Some(uri) => open::that(uri),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no settings page on this platform; grant access via device permissions (e.g. the 'video' group)",
            )),
        }
    }
}

/// Granted when any device named `prefix*` opens, denied when all refuse
///
/// No devices at all is reported as granted: nothing is being withheld,
/// and initialization fails separately with `NoCameraAvailable`.
fn device_status(dir: &Path, prefix: &str) -> PermissionStatus {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return PermissionStatus::Granted;
    };

    let mut found = false;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(prefix) {
            continue;
        }
        found = true;
        match std::fs::File::open(entry.path()) {
            Ok(_) => return PermissionStatus::Granted,
            Err(e) => debug!(device = %entry.path().display(), error = %e, "Device not accessible"),
        }
    }

    if found {
        PermissionStatus::Denied
    } else {
        PermissionStatus::Granted
    }
}

/// Writability of `dir`, judged from the nearest existing ancestor so the
/// lookup never creates anything
fn storage_status(dir: &Path) -> PermissionStatus {
    let Some(existing) = dir.ancestors().find(|p| p.exists()) else {
        return PermissionStatus::Denied;
    };
    match std::fs::metadata(existing) {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => PermissionStatus::Granted,
        Ok(_) => {
            debug!(dir = %existing.display(), "Storage directory is read-only");
            PermissionStatus::Denied
        }
        Err(e) => {
            debug!(dir = %existing.display(), error = %e, "Storage not accessible");
            PermissionStatus::Denied
        }
    }
}

fn default_settings_uri() -> Option<&'static str> {
    if cfg!(target_os = "macos") {
        Some("x-apple.systempreferences:com.apple.preference.security?Privacy_Camera")
    } else if cfg!(target_os = "windows") {
        Some("ms-settings:privacy-webcam")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_projections() {
        let result = PermissionResult::new([
            (CameraPermission::Camera, PermissionStatus::Granted),
            (CameraPermission::Microphone, PermissionStatus::NotDetermined),
        ]);
        assert!(result.camera_granted());
        assert!(!result.microphone_granted());
        assert!(!result.all_granted());
        assert!(PermissionResult::default().all_granted());
    }

    #[test]
    fn test_device_status() {
        let dev = tempfile::tempdir().unwrap();
        assert_eq!(device_status(dev.path(), "video"), PermissionStatus::Granted);

        std::fs::write(dev.path().join("video0"), b"").unwrap();
        assert_eq!(device_status(dev.path(), "video"), PermissionStatus::Granted);
    }

    #[test]
    fn test_storage_status_writable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DevicePermissionBackend::new(dir.path(), dir.path().join("out"));
        assert_eq!(
            backend.status(CameraPermission::Storage),
            PermissionStatus::Granted
        );
        // Status lookups never create the photo directory
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_storage_status_read_only_or_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(storage_status(&file.join("photos")), PermissionStatus::Denied);

        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        let mut perms = std::fs::metadata(&locked).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&locked, perms.clone()).unwrap();
        assert_eq!(storage_status(&locked.join("photos")), PermissionStatus::Denied);

        perms.set_readonly(false);
        std::fs::set_permissions(&locked, perms).unwrap();
        assert_eq!(storage_status(&locked), PermissionStatus::Granted);
    }

    #[test]
    fn test_open_settings_without_uri() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DevicePermissionBackend::new(dir.path(), dir.path()).with_settings_uri(None);
        let err = backend.open_settings().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
