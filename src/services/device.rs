use crate::models::{
    ModPlatform, ModPlugins, PluginCatalog, PluginFolders, PluginFormat, PluginInventory, PluginSet,
    SelectionState,
};
use crate::services::archive::{self, ArchiveEntry, ArchivePackager};
use crate::services::folders;
use crate::services::releases::{DesktopOs, ReleaseSource, ReleaseTarget};
use crate::services::shell::{RemoteShell, shell_quote};
use crate::services::transport::{RemoteTransport, TransportError};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::sync::Arc;

/// The production [`RemoteTransport`].
///
/// VST3 and CLAP bundles live in folders on this machine. MOD Audio bundles live in
/// the device's LV2 directory and are written over the remote shell one file at a
/// time (`mkdir -p` then `cat >` with the file on stdin). Installable plugins come
/// from the catalog and their bundles from the release source.
pub struct DeviceTransport {
    shell: Arc<dyn RemoteShell>,
    releases: Arc<dyn ReleaseSource>,
    catalog: PluginCatalog,
    lv2_dir: String,
    desktop: Option<DesktopOs>,
}

impl DeviceTransport {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        releases: Arc<dyn ReleaseSource>,
        catalog: PluginCatalog,
        lv2_dir: impl Into<String>,
    ) -> Self {
        Self {
            shell,
            releases,
            catalog,
            lv2_dir: lv2_dir.into().trim_end_matches('/').to_string(),
            desktop: DesktopOs::current(),
        }
    }

    /// Download desktop builds for `os` instead of the host OS
    pub fn with_desktop_os(mut self, os: Option<DesktopOs>) -> Self {
        self.desktop = os;
        self
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    fn device_path(&self, relative: &str) -> String {
        format!("{}/{}", self.lv2_dir, relative.trim_start_matches('/'))
    }

    /// Every bundle directory in the device's LV2 directory
    pub async fn device_bundles(&self) -> Result<Vec<String>, TransportError> {
        let stdout = self
            .shell
            .exec(&format!("ls {}", shell_quote(&self.lv2_dir)))
            .await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Whether the device accepts commands at all
    async fn probe(&self) -> Result<(), TransportError> {
        self.shell.exec("true").await?;
        Ok(())
    }

    /// Write bundle files to the device, returning the bundle folders written.
    ///
    /// A bundle that fails halfway is removed before the error is returned.
    async fn write_device_entries(&self, entries: &[ArchiveEntry]) -> Result<Vec<String>, TransportError> {
        let packager = ArchivePackager::default();
        let mut bundles: Vec<String> = Vec::new();
        let mut created_dirs: HashSet<String> = HashSet::new();

        for entry in entries {
            let bundle = packager
                .bundle_name(&entry.path)
                .map_err(|e| TransportError::Archive(e.to_string()))?
                .to_string();

            let destination = self.device_path(&entry.path);
            let parent = destination
                .rsplit_once('/')
                .map(|(parent, _)| parent.to_string())
                .unwrap_or_else(|| self.lv2_dir.clone());

            let written = async {
                if created_dirs.insert(parent.clone()) {
                    self.shell.exec(&format!("mkdir -p {}", shell_quote(&parent))).await?;
                }
                self.shell
                    .exec_with_input(&format!("cat > {}", shell_quote(&destination)), &entry.bytes)
                    .await?;
                Ok::<(), TransportError>(())
            }
            .await;

            if let Err(e) = written {
                tracing::error!("Failed to write {} to the device: {}", destination, e);
                if !e.is_unreachable() {
                    let cleanup = format!("rm -rf {}", shell_quote(&self.device_path(&bundle)));
                    if let Err(cleanup_err) = self.shell.exec(&cleanup).await {
                        tracing::warn!("Could not remove partial bundle {}: {}", bundle, cleanup_err);
                    }
                }
                return Err(e);
            }

            if !bundles.contains(&bundle) {
                bundles.push(bundle);
            }
        }

        Ok(bundles)
    }

    async fn install_local(&self, format: PluginFormat, name: &str, folders: &PluginFolders) -> Result<(), TransportError> {
        let folder = folders::resolve(format, folders)?;
        let os = self
            .desktop
            .ok_or_else(|| TransportError::Download(format!("{} has no {} build for this system", name, format)))?;

        let bundle = format.bundle_name(name);
        let archive_bytes = self.releases.download(name, ReleaseTarget::Desktop(os)).await?;
        let entries = archive::extract_bundle(&archive_bytes, &bundle)?;

        let written = write_local_entries(&folder, &entries).await;
        if let Err(e) = written {
            tracing::error!("Failed to install {} into {}: {}", bundle, folder, e);
            let partial = folder.join(&bundle);
            let cleanup = if partial.is_dir() {
                tokio::fs::remove_dir_all(&partial).await
            } else {
                tokio::fs::remove_file(&partial).await
            };
            if let Err(cleanup_err) = cleanup {
                if cleanup_err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Could not remove partial bundle {}: {}", partial, cleanup_err);
                }
            }
            return Err(e);
        }

        tracing::info!("Installed {} into {}", bundle, folder);
        Ok(())
    }

    async fn install_mod(&self, name: &str, platform: ModPlatform) -> Result<(), TransportError> {
        let bundle = PluginFormat::ModAudio.bundle_name(name);
        let archive_bytes = self.releases.download(name, ReleaseTarget::Mod(platform)).await?;
        let entries = archive::extract_bundle(&archive_bytes, &bundle)?;

        self.write_device_entries(&entries).await?;
        tracing::info!("Installed {} on the MOD {}", bundle, platform);
        Ok(())
    }

    fn installed_locally(&self, format: PluginFormat, folders: &PluginFolders) -> Result<PluginSet, TransportError> {
        let folder = folders::resolve(format, folders)?;

        Ok(self
            .catalog
            .plugins(format, ModPlatform::default())
            .iter()
            .filter(|name| folder.join(format.bundle_name(name)).exists())
            .cloned()
            .collect())
    }
}

async fn write_local_entries(folder: &Utf8Path, entries: &[ArchiveEntry]) -> Result<(), TransportError> {
    for entry in entries {
        let path: Utf8PathBuf = folder.join(&entry.path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &entry.bytes).await?;
    }
    Ok(())
}

#[async_trait]
impl RemoteTransport for DeviceTransport {
    async fn list_installable(
        &self,
        formats: &[PluginFormat],
        platform: ModPlatform,
    ) -> Result<PluginInventory, TransportError> {
        tracing::debug!("Listing installable plugins, active platform {}", platform);
        let mut inventory = self.catalog.installable(formats);

        if formats.contains(&PluginFormat::ModAudio) {
            match self.probe().await {
                Ok(()) => inventory.mod_is_connected = Some(true),
                Err(e) if e.is_unreachable() => {
                    tracing::warn!("MOD device not reachable: {}", e);
                    inventory.mod_audio = ModPlugins::default();
                    inventory.mod_is_connected = Some(false);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(inventory)
    }

    async fn list_installed(
        &self,
        formats: &[PluginFormat],
        folders: &PluginFolders,
        platform: ModPlatform,
    ) -> Result<PluginInventory, TransportError> {
        let mut inventory = PluginInventory::default();

        for format in [PluginFormat::Vst3, PluginFormat::Clap] {
            if formats.contains(&format) {
                *inventory.plugins_mut(format, platform) = self.installed_locally(format, folders)?;
            }
        }

        if formats.contains(&PluginFormat::ModAudio) {
            match self.device_bundles().await {
                Ok(bundles) => {
                    let installed: PluginSet = self
                        .catalog
                        .plugins(PluginFormat::ModAudio, platform)
                        .iter()
                        .filter(|name| bundles.contains(&PluginFormat::ModAudio.bundle_name(name)))
                        .cloned()
                        .collect();
                    inventory.mod_audio = ModPlugins::only(platform, installed);
                    inventory.mod_is_connected = Some(true);
                }
                Err(e) if e.is_unreachable() => {
                    tracing::warn!("MOD device not reachable: {}", e);
                    inventory.mod_is_connected = Some(false);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(inventory)
    }

    async fn create_plugins(
        &self,
        selection: &SelectionState,
        platform: ModPlatform,
        folders: &PluginFolders,
    ) -> Result<SelectionState, TransportError> {
        let mut created = SelectionState::default();

        for format in [PluginFormat::Vst3, PluginFormat::Clap] {
            for name in selection.plugins(format, platform) {
                self.install_local(format, name, folders).await?;
                created.plugins_mut(format, platform).insert(name.clone());
            }
        }

        for name in selection.plugins(PluginFormat::ModAudio, platform) {
            self.install_mod(name, platform).await?;
            created.plugins_mut(PluginFormat::ModAudio, platform).insert(name.clone());
        }

        Ok(created)
    }

    async fn create_from_archive(&self, payload: &[u8]) -> Result<Vec<String>, TransportError> {
        let entries = archive::unpack(payload)?;
        if entries.is_empty() {
            return Err(TransportError::Archive("archive contains no files".to_string()));
        }

        let bundles = self.write_device_entries(&entries).await?;

        Ok(bundles
            .iter()
            .map(|bundle| {
                PluginFormat::ModAudio
                    .plugin_name(bundle)
                    .unwrap_or(bundle)
                    .to_string()
            })
            .collect())
    }

    async fn delete_plugin(
        &self,
        format: PluginFormat,
        name: &str,
        folders: &PluginFolders,
    ) -> Result<(), TransportError> {
        let bundle = format.bundle_name(name);

        if format.is_local() {
            let path = folders::resolve(format, folders)?.join(&bundle);
            match tokio::fs::metadata(&path).await {
                // CLAP plugins are single files outside macOS
                Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(&path).await?,
                Ok(_) => tokio::fs::remove_file(&path).await?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("{} is already gone", path);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
            tracing::info!("Removed {}", path);
        } else {
            self.shell
                .exec(&format!("rm -rf {}", shell_quote(&self.device_path(&bundle))))
                .await?;
            tracing::info!("Removed {} from the MOD device", bundle);
        }

        Ok(())
    }

    async fn delete_plugins(&self, selection: &SelectionState, folders: &PluginFolders) -> Result<(), TransportError> {
        for (format, _, name) in selection.entries() {
            self.delete_plugin(format, &name, folders).await?;
        }
        Ok(())
    }
}
