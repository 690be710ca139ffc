// Sync Controller - Drives the plugin synchronization workflow
//
// This module contains the SyncController which coordinates between:
// - StateManager (session state and change events)
// - InventoryFetcher (installable / installed plugins)
// - BulkExecutor (create and delete calls)
// - ArchivePackager (bundle folders to upload)
//
// Every user action lands here. Failures are turned into notifications or the
// disconnected flag; nothing is returned to the front end as an error.

use crate::config::ConfigManager;
use crate::metrics::SyncMetrics;
use crate::models::{Mode, ModPlatform, PluginFormat};
use crate::services::{
    ArchiveEntry, ArchivePackager, BulkExecutor, InventoryFetcher, RemoteTransport, SyncError,
};
use crate::state::{FetchTicket, NotificationLevel, StateManager};
use camino::Utf8PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Front-end independent controller of one synchronization session
///
/// A CLI and a GUI drive the same methods; each returns whether the action
/// succeeded, and its details arrive as [`StateChange`](crate::state::StateChange)
/// events on the state manager.
///
/// # Example
/// ```ignore
/// let controller = SyncController::new(StateManager::new(), transport)
///     .with_config(config_manager);
/// controller.refresh().await;
/// controller.install_selection().await;
/// ```
#[derive(Clone)]
pub struct SyncController {
    state: StateManager,
    fetcher: InventoryFetcher,
    executor: BulkExecutor,
    packager: ArchivePackager,

    /// Persists folder overrides; `None` keeps them in memory only
    config: Option<ConfigManager>,

    metrics: Arc<SyncMetrics>,
}

impl SyncController {
    pub fn new(state: StateManager, transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            state,
            fetcher: InventoryFetcher::new(Arc::clone(&transport)),
            executor: BulkExecutor::new(transport),
            packager: ArchivePackager::default(),
            config: None,
            metrics: Arc::new(SyncMetrics::new()),
        }
    }

    pub fn with_config(mut self, config: ConfigManager) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_packager(mut self, packager: ArchivePackager) -> Self {
        self.packager = packager;
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Turn a failure into the state the user sees
    fn report(&self, error: &SyncError) {
        self.metrics.record_failure();
        match error {
            SyncError::DeviceUnreachable(reason) => {
                tracing::warn!("MOD device disconnected: {}", reason);
                self.metrics.record_disconnect();
                self.state.mark_disconnected();
            }
            SyncError::Operation(message) => {
                self.state.notify(NotificationLevel::Error, message.clone());
            }
            SyncError::Validation(e) => {
                self.state.notify(NotificationLevel::Error, e.to_string());
            }
        }
    }

    // Fetching

    /// Fetch the inventory for the current mode, formats, folders and platform.
    ///
    /// Returns true if this fetch was applied. A response that was superseded by a
    /// newer fetch is dropped.
    pub async fn refresh(&self) -> bool {
        self.run_fetch(self.state.begin_fetch()).await
    }

    async fn run_fetch(&self, ticket: FetchTicket) -> bool {
        let started = Instant::now();

        let result = self.fetcher.fetch(&ticket.request).await;
        self.metrics.record_fetch(started.elapsed());

        match result {
            Ok(inventory) => {
                let disconnected = inventory.is_mod_disconnected();
                if !self.state.complete_fetch(&ticket, inventory) {
                    self.metrics.record_stale_fetch();
                    return false;
                }
                if disconnected {
                    self.metrics.record_disconnect();
                }
                true
            }
            Err(e) => {
                if self.state.fail_fetch(&ticket, &e.to_string()) {
                    self.report(&e);
                } else {
                    self.metrics.record_stale_fetch();
                }
                false
            }
        }
    }

    /// Retry after the device was reported disconnected
    pub async fn reconnect(&self) -> bool {
        tracing::info!("Reconnecting to MOD device");
        self.refresh().await
    }

    // Session settings

    /// Switch between install and uninstall; always refetches
    pub async fn set_mode(&self, mode: Mode) -> bool {
        self.state.set_mode(mode);
        self.refresh().await
    }

    pub async fn set_formats(&self, formats: &[PluginFormat]) -> bool {
        self.state.set_formats(formats);
        self.refresh().await
    }

    /// Change the active MOD platform.
    ///
    /// Install mode already holds every platform and only the selection is rebuilt.
    /// Uninstall mode lists the device for one platform, so it refetches. Either way
    /// the VST3 and CLAP selection is left as the user made it.
    pub async fn switch_platform(&self, platform: ModPlatform) -> bool {
        self.state.switch_platform(platform);
        if self.state.read(|state| state.mode) == Mode::Uninstall {
            return self.run_fetch(self.state.begin_platform_fetch()).await;
        }
        true
    }

    /// Set or clear the VST3 or CLAP folder override and persist it.
    ///
    /// A change in uninstall mode refetches, since the installed list depends on it.
    pub async fn set_folder(&self, format: PluginFormat, folder: Option<Utf8PathBuf>) -> bool {
        if !format.is_local() {
            tracing::warn!("{} has no local folder", format);
            return false;
        }

        if !self.state.set_folder(format, folder) {
            return true;
        }

        let (folders, mode) = self.state.read(|state| (state.folders.clone(), state.mode));
        tracing::info!("{} folder set to {:?}", format, folders.get(format));

        if let Some(config) = &self.config {
            if let Err(e) = config.save_plugin_folders(&folders) {
                tracing::error!("Failed to save plugin folders: {:#}", e);
                self.state
                    .notify(NotificationLevel::Error, format!("Failed to save plugin folders: {}", e));
            }
        }

        if mode == Mode::Uninstall {
            return self.refresh().await;
        }
        true
    }

    // Bulk operations

    /// Install the current selection
    pub async fn install_selection(&self) -> bool {
        let (selection, platform, folders) = self
            .state
            .read(|state| (state.selection.clone(), state.active_platform, state.folders.clone()));

        if selection.is_empty() {
            self.state.notify(NotificationLevel::Error, "No plugins selected");
            return false;
        }

        if !self.state.begin_processing() {
            tracing::warn!("Install requested while another operation is running");
            return false;
        }

        let succeeded = match self.executor.create(&selection, platform, &folders).await {
            Ok(created) => {
                self.state.apply_created_selection(&created);
                self.metrics.record_created(created.len());
                self.state.notify(NotificationLevel::Success, "Finished installing plugins");
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        };

        self.state.finish_processing();
        succeeded
    }

    /// Uninstall the current selection as one bulk request
    pub async fn uninstall_selection(&self) -> bool {
        let (selection, folders) = self.state.read(|state| (state.selection.clone(), state.folders.clone()));

        if selection.is_empty() {
            self.state.notify(NotificationLevel::Error, "No plugins selected");
            return false;
        }

        if !self.state.begin_processing() {
            tracing::warn!("Uninstall requested while another operation is running");
            return false;
        }

        let succeeded = match self.executor.remove_selection(&selection, &folders).await {
            Ok(()) => {
                self.state.apply_removed_selection(&selection);
                self.metrics.record_removed(selection.len());
                self.state.notify(NotificationLevel::Success, "Finished uninstalling plugins");
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        };

        self.state.finish_processing();
        succeeded
    }

    /// Package bundle folders from disk and upload them to the device
    pub async fn upload_folders(&self, folders: &[Utf8PathBuf]) -> bool {
        let mut entries = Vec::new();
        for folder in folders {
            match self.packager.collect_folder(folder) {
                Ok(found) => entries.extend(found),
                Err(e) => {
                    self.report(&SyncError::from(e));
                    return false;
                }
            }
        }
        self.upload_files(&entries).await
    }

    /// Package dropped files and upload them to the device
    pub async fn upload_files(&self, files: &[ArchiveEntry]) -> bool {
        let archive = match self.packager.package_files(files) {
            Ok(archive) => archive,
            Err(e) => {
                tracing::warn!("Rejected upload: {}", e);
                self.report(&SyncError::from(e));
                return false;
            }
        };

        if !self.state.begin_processing() {
            tracing::warn!("Upload requested while another operation is running");
            return false;
        }

        let succeeded = match self.executor.create_from_archive(&archive).await {
            Ok(created) => {
                self.state.apply_created(PluginFormat::ModAudio, &created);
                self.metrics.record_created(created.len());
                self.state
                    .notify(NotificationLevel::Success, format!("Added {}.", comma_join(&created)));
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        };

        self.state.finish_processing();
        succeeded
    }

    /// Remove one plugin, tracked on its own
    pub async fn remove(&self, format: PluginFormat, name: &str) -> bool {
        if !self.state.begin_removal(format, name) {
            tracing::warn!("{} {} is already being removed", format, name);
            return false;
        }

        let folders = self.state.read(|state| state.folders.clone());
        match self.executor.remove(format, name, &folders).await {
            Ok(()) => {
                self.state.finish_removal(format, name, true);
                self.metrics.record_removed(1);
                self.state
                    .notify(NotificationLevel::Success, format!("Removed \"{}\".", name));
                true
            }
            Err(e) => {
                self.state.finish_removal(format, name, false);
                self.report(&e);
                false
            }
        }
    }

    /// Run [`remove`](Self::remove) on its own task
    pub fn spawn_remove(&self, format: PluginFormat, name: impl Into<String>) -> JoinHandle<bool> {
        let controller = self.clone();
        let name = name.into();
        tokio::spawn(async move { controller.remove(format, &name).await })
    }

    /// Remove several plugins concurrently. Returns true if all of them were removed.
    ///
    /// Each removal is independent: one failing neither stops nor undoes the others.
    pub async fn remove_many(&self, format: PluginFormat, names: &[String]) -> bool {
        let tasks: Vec<_> = names
            .iter()
            .map(|name| self.spawn_remove(format, name.clone()))
            .collect();

        let mut all_removed = true;
        for task in tasks {
            match task.await {
                Ok(removed) => all_removed &= removed,
                Err(e) => {
                    tracing::error!("Removal task join error: {}", e);
                    all_removed = false;
                }
            }
        }
        all_removed
    }
}

/// Join names for a notification: `A`, `A & B`, `A, B & C`
pub fn comma_join(items: &[String]) -> String {
    match items.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} & {}", rest.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModPlugins, PluginInventory, PluginSet, SelectionState};
    use crate::services::transport::{MockRemoteTransport, TransportError};
    use crate::state::StateChange;

    fn set(names: &[&str]) -> PluginSet {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn notifications(rx: &mut tokio::sync::broadcast::Receiver<StateChange>) -> Vec<(NotificationLevel, String)> {
        let mut found = Vec::new();
        while let Ok(change) = rx.try_recv() {
            if let StateChange::Notification { level, message } = change {
                found.push((level, message));
            }
        }
        found
    }

    fn installed() -> PluginInventory {
        PluginInventory {
            vst3: set(&["A", "B"]),
            mod_audio: ModPlugins::only(ModPlatform::Dwarf, set(&["C"])),
            mod_is_connected: Some(true),
            ..PluginInventory::default()
        }
    }

    #[test]
    fn test_comma_join() {
        assert_eq!(comma_join(&[]), "");
        assert_eq!(comma_join(&strings(&["A"])), "A");
        assert_eq!(comma_join(&strings(&["A", "B"])), "A & B");
        assert_eq!(comma_join(&strings(&["A", "B", "C"])), "A, B & C");
    }

    #[tokio::test]
    async fn test_refresh_reconciles_selection() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_list_installable().returning(|_, _| Ok(installed()));

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        assert!(controller.refresh().await);

        let state = controller.state().snapshot();
        assert_eq!(state.selection.vst3, set(&["A", "B"]));
        assert_eq!(state.selection.mod_audio.dwarf, set(&["C"]));
        assert_eq!(controller.metrics().fetches.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_notifies() {
        let mut transport = MockRemoteTransport::new();
        transport
            .expect_list_installable()
            .returning(|_, _| Err(TransportError::Download("dm-LFO: HTTP 500".into())));

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        let mut rx = controller.state().subscribe();

        assert!(!controller.refresh().await);

        let state = controller.state().snapshot();
        assert!(!state.is_fetching);
        assert!(!state.mod_disconnected);
        assert_eq!(notifications(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_install_merges_created_names() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_list_installable().returning(|_, _| {
            Ok(PluginInventory {
                mod_audio: ModPlugins::only(ModPlatform::Dwarf, set(&["Foo"])),
                mod_is_connected: Some(true),
                ..PluginInventory::default()
            })
        });
        transport.expect_create_plugins().returning(|_, _, _| {
            Ok(SelectionState {
                mod_audio: ModPlugins::only(ModPlatform::Dwarf, set(&["Foo", "Bar"])),
                ..SelectionState::default()
            })
        });

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        controller.refresh().await;
        let mut rx = controller.state().subscribe();

        assert!(controller.install_selection().await);

        let state = controller.state().snapshot();
        let names: Vec<_> = state.inventory.mod_audio.dwarf.iter().cloned().collect();
        assert_eq!(names, vec!["Bar", "Foo"]);
        assert!(!state.is_processing);
        assert_eq!(
            notifications(&mut rx),
            vec![(NotificationLevel::Success, "Finished installing plugins".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unreachable_install_marks_disconnected() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_list_installable().returning(|_, _| Ok(installed()));
        transport
            .expect_create_plugins()
            .returning(|_, _, _| Err(TransportError::Unreachable("Ssh connection timed out".into())));

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        controller.refresh().await;

        assert!(!controller.install_selection().await);

        let state = controller.state().snapshot();
        assert!(state.mod_disconnected);
        assert!(!state.is_processing);
        assert_eq!(state.inventory, installed());
    }

    #[tokio::test]
    async fn test_uninstall_prunes_removed_names() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_list_installed().returning(|_, _, _| Ok(installed()));
        transport.expect_delete_plugins().returning(|_, _| Ok(()));

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        controller.set_mode(Mode::Uninstall).await;
        controller.state().toggle(PluginFormat::Vst3, "B");

        assert!(controller.uninstall_selection().await);

        let state = controller.state().snapshot();
        assert_eq!(state.inventory.vst3, set(&["B"]));
        assert!(state.inventory.mod_audio.dwarf.is_empty());
        assert!(state.selection.vst3.is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejects_non_bundles() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_create_from_archive().never();

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        let mut rx = controller.state().subscribe();

        let uploaded = controller
            .upload_files(&[ArchiveEntry::new("readme.txt", b"hi".to_vec())])
            .await;

        assert!(!uploaded);
        let found = notifications(&mut rx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, NotificationLevel::Error);
        assert!(!controller.state().snapshot().mod_disconnected);
    }

    #[tokio::test]
    async fn test_upload_adds_created_bundles() {
        let mut transport = MockRemoteTransport::new();
        transport
            .expect_create_from_archive()
            .times(1)
            .returning(|_| Ok(strings(&["dm-LFO", "dm-Stutter"])));

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        let mut rx = controller.state().subscribe();

        let uploaded = controller
            .upload_files(&[
                ArchiveEntry::new("dm-LFO.lv2/manifest.ttl", b"a".to_vec()),
                ArchiveEntry::new("dm-Stutter.lv2/manifest.ttl", b"b".to_vec()),
            ])
            .await;

        assert!(uploaded);
        assert_eq!(
            controller.state().read(|state| state.inventory.mod_audio.dwarf.clone()),
            set(&["dm-LFO", "dm-Stutter"])
        );
        assert_eq!(
            notifications(&mut rx),
            vec![(NotificationLevel::Success, "Added dm-LFO & dm-Stutter.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_remove_failure_keeps_plugin() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_list_installed().returning(|_, _, _| Ok(installed()));
        transport
            .expect_delete_plugin()
            .returning(|_, _, _| Err(TransportError::Command("rm: permission denied".into())));

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        controller.set_mode(Mode::Uninstall).await;

        assert!(!controller.remove(PluginFormat::Vst3, "A").await);

        let state = controller.state().snapshot();
        assert!(state.inventory.vst3.contains("A"));
        assert!(state.selection.vst3.contains("A"));
        assert!(state.removals.is_empty());
        assert!(state.last_error.unwrap().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_set_folder_in_uninstall_mode_refetches() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_list_installed().times(2).returning(|_, _, _| Ok(installed()));

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        controller.set_mode(Mode::Uninstall).await;

        assert!(controller.set_folder(PluginFormat::Vst3, Some(Utf8PathBuf::from("/opt/vst3"))).await);
        // Unchanged, no refetch
        assert!(controller.set_folder(PluginFormat::Vst3, Some(Utf8PathBuf::from("/opt/vst3"))).await);
        assert!(!controller.set_folder(PluginFormat::ModAudio, None).await);
    }

    #[tokio::test]
    async fn test_switch_platform_in_install_mode_uses_fetched_inventory() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_list_installable().times(1).returning(|_, _| {
            Ok(PluginInventory {
                mod_audio: ModPlugins {
                    duo: set(&["dm-LFO"]),
                    dwarf: set(&["dm-Stutter"]),
                    ..ModPlugins::default()
                },
                mod_is_connected: Some(true),
                ..PluginInventory::default()
            })
        });

        let controller = SyncController::new(StateManager::new(), Arc::new(transport));
        controller.refresh().await;

        assert!(controller.switch_platform(ModPlatform::Duo).await);

        let selection = controller.state().read(|state| state.selection.clone());
        assert_eq!(selection.mod_audio.duo, set(&["dm-LFO"]));
        assert!(selection.mod_audio.dwarf.is_empty());
    }
}
