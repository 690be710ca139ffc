//! End-to-end tests of the synchronization workflow
//!
//! A scripted in-memory device stands in for the MOD device and the local plugin
//! folders. These tests verify:
//! - Fetch results reconcile into the expected selection
//! - Mode switches reset the selection to the fresh inventory
//! - Platform switches leave the VST3 and CLAP selection alone
//! - Removals are independent of each other
//! - Only server-confirmed names reach the displayed inventory
//! - Superseded fetches never overwrite newer ones

use async_trait::async_trait;
use modsync::models::{ModPlugins, PluginSet};
use modsync::services::{RemoteTransport, TransportError};
use modsync::state::{NotificationLevel, StateChange, event_capacity_for};
use modsync::{
    Mode, ModPlatform, PluginFolders, PluginFormat, PluginInventory, SelectionState, SessionState,
    StateManager, SyncController,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::Ordering;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Duration;

fn set(names: &[&str]) -> PluginSet {
    names.iter().map(|n| n.to_string()).collect()
}

/// In-memory device with scripted failures
#[derive(Default)]
struct FakeDevice {
    installable: Mutex<PluginInventory>,
    installed: Mutex<PluginInventory>,
    /// Names whose delete fails with a command error
    failing_deletes: HashSet<String>,
    unreachable: bool,
    /// Delay of each successive list call
    list_delays: Mutex<VecDeque<Duration>>,
    /// Names reported by `create_plugins`, regardless of the request
    created: Option<SelectionState>,
}

impl FakeDevice {
    async fn delay(&self) {
        let delay = self.list_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_reachable(&self) -> Result<(), TransportError> {
        if self.unreachable {
            return Err(TransportError::Unreachable("Ssh connection timed out".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTransport for FakeDevice {
    async fn list_installable(
        &self,
        _formats: &[PluginFormat],
        _platform: ModPlatform,
    ) -> Result<PluginInventory, TransportError> {
        self.delay().await;
        Ok(self.installable.lock().unwrap().clone())
    }

    async fn list_installed(
        &self,
        _formats: &[PluginFormat],
        _folders: &PluginFolders,
        _platform: ModPlatform,
    ) -> Result<PluginInventory, TransportError> {
        self.delay().await;
        Ok(self.installed.lock().unwrap().clone())
    }

    async fn create_plugins(
        &self,
        selection: &SelectionState,
        _platform: ModPlatform,
        _folders: &PluginFolders,
    ) -> Result<SelectionState, TransportError> {
        self.check_reachable()?;
        Ok(self.created.clone().unwrap_or_else(|| selection.clone()))
    }

    async fn create_from_archive(&self, _payload: &[u8]) -> Result<Vec<String>, TransportError> {
        self.check_reachable()?;
        Ok(Vec::new())
    }

    async fn delete_plugin(
        &self,
        format: PluginFormat,
        name: &str,
        _folders: &PluginFolders,
    ) -> Result<(), TransportError> {
        self.check_reachable()?;
        // Let concurrent removals interleave
        tokio::task::yield_now().await;

        if self.failing_deletes.contains(name) {
            return Err(TransportError::Command(format!("rm: cannot remove '{}'", name)));
        }
        let mut installed = self.installed.lock().unwrap();
        for platform in ModPlatform::ALL {
            installed.plugins_mut(format, platform).shift_remove(name);
        }
        Ok(())
    }

    async fn delete_plugins(
        &self,
        selection: &SelectionState,
        folders: &PluginFolders,
    ) -> Result<(), TransportError> {
        for (format, _, name) in selection.entries() {
            self.delete_plugin(format, &name, folders).await?;
        }
        Ok(())
    }
}

fn controller(device: FakeDevice) -> SyncController {
    SyncController::new(StateManager::new(), Arc::new(device))
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

#[tokio::test]
async fn test_disconnected_device_hides_only_mod_audio() {
    let device = FakeDevice {
        installable: Mutex::new(PluginInventory {
            vst3: set(&["A"]),
            clap: set(&["B"]),
            mod_audio: ModPlugins::only(ModPlatform::Dwarf, set(&["C"])),
            mod_is_connected: Some(false),
        }),
        ..FakeDevice::default()
    };
    let controller = controller(device);

    assert!(controller.refresh().await);

    let state = controller.state().snapshot();
    assert!(state.mod_disconnected);
    assert!(state.inventory.visible(PluginFormat::ModAudio, ModPlatform::Dwarf).is_none());
    assert!(state.selection.mod_audio.is_empty());
    assert_eq!(state.selection.vst3, set(&["A"]));
    assert_eq!(state.selection.clap, set(&["B"]));
    assert_eq!(controller.metrics().disconnects.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_fetch_selects_everything_for_active_platform() {
    let device = FakeDevice {
        installable: Mutex::new(PluginInventory {
            vst3: set(&["A", "B"]),
            clap: set(&[]),
            mod_audio: ModPlugins::only(ModPlatform::Dwarf, set(&["C"])),
            mod_is_connected: Some(true),
        }),
        ..FakeDevice::default()
    };
    let controller = controller(device);

    controller.refresh().await;

    let selection = controller.state().read(|state| state.selection.clone());
    assert_eq!(
        selection,
        SelectionState {
            vst3: set(&["A", "B"]),
            clap: set(&[]),
            mod_audio: ModPlugins {
                duo: set(&[]),
                duo_x: set(&[]),
                dwarf: set(&["C"]),
            },
        }
    );
}

#[tokio::test]
async fn test_mode_switch_resets_deselection() {
    let device = FakeDevice {
        installable: Mutex::new(PluginInventory {
            vst3: set(&["A", "B"]),
            ..PluginInventory::default()
        }),
        installed: Mutex::new(PluginInventory {
            vst3: set(&["A", "B", "D"]),
            ..PluginInventory::default()
        }),
        ..FakeDevice::default()
    };
    let controller = controller(device);

    controller.refresh().await;
    controller.state().toggle(PluginFormat::Vst3, "A");
    assert_eq!(controller.state().read(|state| state.selection.vst3.clone()), set(&["B"]));

    assert!(controller.set_mode(Mode::Uninstall).await);

    assert_eq!(
        controller.state().read(|state| state.selection.vst3.clone()),
        set(&["A", "B", "D"])
    );
}

#[tokio::test]
async fn test_platform_switch_in_uninstall_mode_keeps_local_deselection() {
    let device = FakeDevice {
        installed: Mutex::new(PluginInventory {
            vst3: set(&["A", "B"]),
            mod_audio: ModPlugins {
                duo: set(&["D"]),
                duo_x: set(&[]),
                dwarf: set(&["C"]),
            },
            mod_is_connected: Some(true),
            ..PluginInventory::default()
        }),
        ..FakeDevice::default()
    };
    let controller = controller(device);
    controller.set_mode(Mode::Uninstall).await;
    controller.state().toggle(PluginFormat::Vst3, "A");

    assert!(controller.switch_platform(ModPlatform::Duo).await);

    let state = controller.state().snapshot();
    assert_eq!(state.active_platform, ModPlatform::Duo);
    assert_eq!(state.selection.vst3, set(&["B"]));
    assert_eq!(state.selection.mod_audio.duo, set(&["D"]));
    assert!(state.selection.mod_audio.dwarf.is_empty());
}

#[tokio::test]
async fn test_concurrent_removals_fail_independently() {
    let device = FakeDevice {
        installed: Mutex::new(PluginInventory {
            mod_audio: ModPlugins::only(ModPlatform::Dwarf, set(&["A", "B"])),
            mod_is_connected: Some(true),
            ..PluginInventory::default()
        }),
        failing_deletes: ["A".to_string()].into_iter().collect(),
        ..FakeDevice::default()
    };
    let controller = controller(device);
    controller.set_mode(Mode::Uninstall).await;
    let mut rx = controller.state().subscribe();

    let remove_a = controller.spawn_remove(PluginFormat::ModAudio, "A");
    let remove_b = controller.spawn_remove(PluginFormat::ModAudio, "B");
    assert!(!remove_a.await.unwrap());
    assert!(remove_b.await.unwrap());

    let state = controller.state().snapshot();
    assert_eq!(state.inventory.mod_audio.dwarf, set(&["A"]));
    assert_eq!(state.selection.mod_audio.dwarf, set(&["A"]));
    assert!(state.removals.is_empty());
    assert!(!state.mod_disconnected);

    let found = notifications(&mut rx);
    assert!(found.contains(&(NotificationLevel::Success, "Removed \"B\".".to_string())));
    assert!(found.iter().any(|(level, _)| *level == NotificationLevel::Error));
}

#[tokio::test]
async fn test_remove_many_reports_partial_failure() {
    let device = FakeDevice {
        installed: Mutex::new(PluginInventory {
            vst3: set(&["A", "B", "C"]),
            ..PluginInventory::default()
        }),
        failing_deletes: ["B".to_string()].into_iter().collect(),
        ..FakeDevice::default()
    };
    let controller = controller(device);
    controller.set_mode(Mode::Uninstall).await;

    let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    assert!(!controller.remove_many(PluginFormat::Vst3, &names).await);

    let state = controller.state().snapshot();
    assert_eq!(state.inventory.vst3, set(&["B"]));
    assert_eq!(controller.metrics().plugins_removed.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_create_merges_only_confirmed_names() {
    let device = FakeDevice {
        installable: Mutex::new(PluginInventory {
            vst3: set(&["Foo"]),
            ..PluginInventory::default()
        }),
        created: Some(SelectionState {
            vst3: set(&["Foo", "Bar"]),
            ..SelectionState::default()
        }),
        ..FakeDevice::default()
    };
    let controller = controller(device);
    controller.refresh().await;

    assert!(controller.install_selection().await);

    let plugins: Vec<String> = controller
        .state()
        .read(|state| state.inventory.vst3.iter().cloned().collect());
    assert_eq!(plugins, vec!["Bar", "Foo"]);
}

#[tokio::test]
async fn test_unreachable_device_leaves_inventory_untouched() {
    let device = FakeDevice {
        installable: Mutex::new(PluginInventory {
            mod_audio: ModPlugins::only(ModPlatform::Dwarf, set(&["C"])),
            mod_is_connected: Some(true),
            ..PluginInventory::default()
        }),
        unreachable: true,
        ..FakeDevice::default()
    };
    let controller = controller(device);
    controller.refresh().await;
    let before = controller.state().snapshot();
    let mut rx = controller.state().subscribe();

    assert!(!controller.install_selection().await);

    let after = controller.state().snapshot();
    assert!(after.mod_disconnected);
    assert_eq!(after.inventory, before.inventory);
    assert_eq!(after.selection, before.selection);
    assert!(notifications(&mut rx).is_empty());

    // Reconnecting is a fresh fetch
    assert!(controller.reconnect().await);
    assert!(!controller.state().snapshot().mod_disconnected);
}

#[tokio::test]
async fn test_superseded_fetch_is_discarded() {
    let device = FakeDevice {
        installable: Mutex::new(PluginInventory {
            vst3: set(&["A"]),
            ..PluginInventory::default()
        }),
        list_delays: Mutex::new(VecDeque::from([Duration::from_millis(100)])),
        ..FakeDevice::default()
    };
    let device = Arc::new(device);
    let controller = SyncController::new(StateManager::new(), device.clone());

    let slow = controller.clone();
    let (first, second) = tokio::join!(slow.refresh(), async {
        // Let the first fetch take its ticket before changing the answer
        tokio::task::yield_now().await;
        *device.installable.lock().unwrap() = PluginInventory {
            vst3: set(&["B"]),
            ..PluginInventory::default()
        };
        controller.refresh().await
    });

    assert!(!first);
    assert!(second);
    assert_eq!(controller.state().read(|state| state.inventory.vst3.clone()), set(&["B"]));
    assert_eq!(controller.metrics().stale_fetches.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_every_failed_removal_is_reported() {
    let names: Vec<String> = (0..60).map(|i| format!("plugin-{:02}", i)).collect();
    let device = FakeDevice {
        failing_deletes: names.iter().cloned().collect(),
        ..FakeDevice::default()
    };
    let state = StateManager::with_capacity(SessionState::default(), event_capacity_for(names.len()));
    let controller = SyncController::new(state, Arc::new(device));
    let mut rx = controller.state().subscribe();

    assert!(!controller.remove_many(PluginFormat::Vst3, &names).await);

    let mut errors = 0;
    loop {
        match rx.try_recv() {
            Ok(StateChange::Notification {
                level: NotificationLevel::Error,
                ..
            }) => errors += 1,
            Ok(_) => {}
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("Notifications were lost: {:?}", e),
        }
    }
    assert_eq!(errors, names.len());
    assert_eq!(controller.metrics().failed_operations.load(Ordering::Relaxed), 60);
}
