//! Radio adapter acquisition and release.
//!
//! The scanner owns exactly one device handle, acquired in
//! [`Scanner::init`](crate::Scanner::init) and released in
//! [`Scanner::close`](crate::Scanner::close).

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default sysfs directory listing Bluetooth adapters.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/bluetooth";

/// Identifier that resolves to the first available adapter.
pub const DEFAULT_DEVICE: &str = "default";

/// Identifier selecting [`DetachedDeviceProvider`].
pub const DETACHED_DEVICE: &str = "none";

/// Errors raised while acquiring or releasing a device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The requested adapter does not exist.
    #[error("adapter '{0}' not found")]
    NotFound(String),

    /// No adapter is present at all.
    #[error("no bluetooth adapter found under {}", .0.display())]
    NoAdapter(PathBuf),

    /// Filesystem error while probing adapters.
    #[error("device io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An acquired radio adapter.
#[async_trait::async_trait]
pub trait Device: Send + Sync {
    /// Adapter identifier (e.g. `hci0`).
    fn id(&self) -> &str;

    /// Release the adapter.
    async fn release(&self) -> Result<(), DeviceError>;
}

/// Factory for [`Device`] handles.
#[async_trait::async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Acquire the adapter named by `identifier`.
    async fn acquire(&self, identifier: &str) -> Result<Box<dyn Device>, DeviceError>;
}

// =============================================================================
// HCI adapters
// =============================================================================

/// Resolves HCI adapters from sysfs.
#[derive(Debug, Clone)]
pub struct HciDeviceProvider {
    sysfs_root: PathBuf,
}

impl Default for HciDeviceProvider {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl HciDeviceProvider {
    pub fn new(sysfs_root: impl AsRef<Path>) -> Self {
        Self {
            sysfs_root: sysfs_root.as_ref().to_path_buf(),
        }
    }

    async fn first_adapter(&self) -> Result<String, DeviceError> {
        let mut entries = match tokio::fs::read_dir(&self.sysfs_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DeviceError::NoAdapter(self.sysfs_root.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut adapters = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str()
                && name.starts_with("hci")
            {
                adapters.push(name.to_string());
            }
        }
        adapters.sort();
        adapters
            .into_iter()
            .next()
            .ok_or_else(|| DeviceError::NoAdapter(self.sysfs_root.clone()))
    }
}

#[async_trait::async_trait]
impl DeviceProvider for HciDeviceProvider {
    async fn acquire(&self, identifier: &str) -> Result<Box<dyn Device>, DeviceError> {
        let id = if identifier == DEFAULT_DEVICE {
            self.first_adapter().await?
        } else {
            identifier.to_string()
        };

        let path = self.sysfs_root.join(&id);
        if !tokio::fs::try_exists(&path).await? {
            return Err(DeviceError::NotFound(id));
        }

        tracing::debug!(adapter = %id, path = %path.display(), "Acquired adapter");
        Ok(Box::new(HciDevice { id, path }))
    }
}

/// Handle to an HCI adapter.
#[derive(Debug)]
pub struct HciDevice {
    id: String,
    path: PathBuf,
}

#[async_trait::async_trait]
impl Device for HciDevice {
    fn id(&self) -> &str {
        &self.id
    }

    async fn release(&self) -> Result<(), DeviceError> {
        // The adapter may have been unplugged while scanning.
        if !tokio::fs::try_exists(&self.path).await? {
            return Err(DeviceError::NotFound(self.id.clone()));
        }
        tracing::debug!(adapter = %self.id, "Released adapter");
        Ok(())
    }
}

// =============================================================================
// Detached
// =============================================================================

/// Provider for deployments where an external process owns the radio and
/// only feeds decoded records in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedDeviceProvider;

#[derive(Debug)]
struct DetachedDevice;

#[async_trait::async_trait]
impl DeviceProvider for DetachedDeviceProvider {
    async fn acquire(&self, _identifier: &str) -> Result<Box<dyn Device>, DeviceError> {
        Ok(Box::new(DetachedDevice))
    }
}

#[async_trait::async_trait]
impl Device for DetachedDevice {
    fn id(&self) -> &str {
        DETACHED_DEVICE
    }

    async fn release(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Pick a provider for a configured device identifier.
pub fn provider_for(identifier: &str) -> Box<dyn DeviceProvider> {
    if identifier == DETACHED_DEVICE {
        Box::new(DetachedDeviceProvider)
    } else {
        Box::new(HciDeviceProvider::default())
    }
}
