use crate::models::{FetchRequest, Mode, ModPlugins, PluginFormat, PluginInventory};
use crate::services::transport::{RemoteTransport, SyncError};
use std::sync::Arc;

/// Asks the transport what is installable or installed.
///
/// The result is normalized: formats that were not requested are empty and an
/// unreachable device yields a disconnected inventory instead of an error.
#[derive(Clone)]
pub struct InventoryFetcher {
    transport: Arc<dyn RemoteTransport>,
}

impl InventoryFetcher {
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self { transport }
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<PluginInventory, SyncError> {
        tracing::info!(
            "Fetching {} plugins for {:?} (MOD {})",
            match request.mode {
                Mode::Install => "installable",
                Mode::Uninstall => "installed",
            },
            request.formats,
            request.platform
        );

        let result = match request.mode {
            Mode::Install => {
                self.transport
                    .list_installable(&request.formats, request.platform)
                    .await
            }
            Mode::Uninstall => {
                self.transport
                    .list_installed(&request.formats, &request.folders, request.platform)
                    .await
            }
        };

        match result {
            Ok(inventory) => Ok(normalize(inventory, request)),
            Err(e) if e.is_unreachable() => {
                tracing::warn!("Fetch failed, MOD device unreachable: {}", e);
                Ok(PluginInventory::disconnected())
            }
            Err(e) => {
                tracing::error!("Fetch failed: {}", e);
                Err(e.into())
            }
        }
    }
}

fn normalize(mut inventory: PluginInventory, request: &FetchRequest) -> PluginInventory {
    inventory.retain_formats(&request.formats);

    if !request.wants(PluginFormat::ModAudio) {
        inventory.mod_is_connected = None;
    } else if inventory.is_mod_disconnected() {
        inventory.mod_audio = ModPlugins::default();
    }

    inventory
}
