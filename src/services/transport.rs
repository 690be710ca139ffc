use crate::models::{ModPlatform, PluginFolders, PluginFormat, PluginInventory, SelectionState};
use crate::services::archive::ValidationError;
use async_trait::async_trait;
use thiserror::Error;

/// Failures of a single transport call.
///
/// Only [`TransportError::Unreachable`] means the device could not be reached;
/// everything else is an operation that reached its target and failed there.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("MOD device unreachable: {0}")]
    Unreachable(String),

    #[error("Remote command failed: {0}")]
    Command(String),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid plugin archive: {0}")]
    Archive(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("No {0} plugin folder available on this system")]
    NoPluginFolder(PluginFormat),
}

impl TransportError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Errors surfaced to the workflow, already classified for the user.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The device could not be reached. Reconnecting means fetching again.
    #[error("MOD device is not connected: {0}")]
    DeviceUnreachable(String),

    /// The call reached its target and failed; connectivity is unchanged.
    #[error("{0}")]
    Operation(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl SyncError {
    pub fn is_device_unreachable(&self) -> bool {
        matches!(self, Self::DeviceUnreachable(_))
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unreachable(reason) => Self::DeviceUnreachable(reason),
            other => Self::Operation(other.to_string()),
        }
    }
}

/// Remote procedures behind the synchronization workflow.
///
/// The production implementation is [`DeviceTransport`](crate::services::DeviceTransport),
/// which talks to the MOD device over SSH and to the local plugin folders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Plugins that can be installed for `formats`. `platform` is the active MOD platform.
    async fn list_installable(
        &self,
        formats: &[PluginFormat],
        platform: ModPlatform,
    ) -> Result<PluginInventory, TransportError>;

    /// Plugins currently installed in `folders` and on the device
    async fn list_installed(
        &self,
        formats: &[PluginFormat],
        folders: &PluginFolders,
        platform: ModPlatform,
    ) -> Result<PluginInventory, TransportError>;

    /// Install the selection, returning the plugins that were actually created
    async fn create_plugins(
        &self,
        selection: &SelectionState,
        platform: ModPlatform,
        folders: &PluginFolders,
    ) -> Result<SelectionState, TransportError>;

    /// Unpack a zip of LV2 bundles onto the device, returning the plugin names written
    async fn create_from_archive(&self, payload: &[u8]) -> Result<Vec<String>, TransportError>;

    async fn delete_plugin(
        &self,
        format: PluginFormat,
        name: &str,
        folders: &PluginFolders,
    ) -> Result<(), TransportError>;

    async fn delete_plugins(
        &self,
        selection: &SelectionState,
        folders: &PluginFolders,
    ) -> Result<(), TransportError>;
}
