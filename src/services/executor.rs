use crate::models::{ModPlatform, PluginFolders, PluginFormat, SelectionState};
use crate::services::archive::PackagedArchive;
use crate::services::transport::{RemoteTransport, SyncError};
use std::sync::Arc;

/// Issues create and delete calls and classifies their failures.
///
/// Each call maps to exactly one transport call. Nothing is retried; a
/// [`SyncError::DeviceUnreachable`] is left to the caller to offer a reconnect.
#[derive(Clone)]
pub struct BulkExecutor {
    transport: Arc<dyn RemoteTransport>,
}

impl BulkExecutor {
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self { transport }
    }

    /// Install `selection`, returning what was actually created
    pub async fn create(
        &self,
        selection: &SelectionState,
        platform: ModPlatform,
        folders: &PluginFolders,
    ) -> Result<SelectionState, SyncError> {
        if selection.is_empty() {
            return Ok(SelectionState::default());
        }

        tracing::info!("Installing {} plugins", selection.len());
        let created = self
            .transport
            .create_plugins(selection, platform, folders)
            .await
            .inspect_err(|e| tracing::error!("Install failed: {}", e))?;

        tracing::info!("Installed {} plugins", created.len());
        Ok(created)
    }

    /// Upload a packaged archive of LV2 bundles to the device
    pub async fn create_from_archive(&self, archive: &PackagedArchive) -> Result<Vec<String>, SyncError> {
        tracing::info!("Uploading {} ({} bytes)", archive.names.join(", "), archive.payload.len());

        let created = self
            .transport
            .create_from_archive(&archive.payload)
            .await
            .inspect_err(|e| tracing::error!("Upload failed: {}", e))?;

        Ok(created)
    }

    pub async fn remove(&self, format: PluginFormat, name: &str, folders: &PluginFolders) -> Result<(), SyncError> {
        tracing::info!("Removing {} {}", format, name);

        self.transport
            .delete_plugin(format, name, folders)
            .await
            .inspect_err(|e| tracing::error!("Removing {} {} failed: {}", format, name, e))?;
        Ok(())
    }

    pub async fn remove_selection(&self, selection: &SelectionState, folders: &PluginFolders) -> Result<(), SyncError> {
        if selection.is_empty() {
            return Ok(());
        }

        tracing::info!("Uninstalling {} plugins", selection.len());
        self.transport
            .delete_plugins(selection, folders)
            .await
            .inspect_err(|e| tracing::error!("Uninstall failed: {}", e))?;
        Ok(())
    }
}
