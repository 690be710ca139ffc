//! Selection reconciliation.
//!
//! A selection is always a subset of the inventory it was derived from. A fresh
//! fetch selects everything; afterwards only user edits and pruning change it.
//! Every function here is pure and keeps that subset property.

use crate::models::{ModPlatform, ModPlugins, PluginFormat, PluginInventory, PluginSet, SelectionState};

/// Selection for a freshly fetched inventory: everything visible is selected.
///
/// Only `platform` is populated in the MOD Audio branch, and nothing is selected
/// there while the device is disconnected.
pub fn reconcile(inventory: &PluginInventory, platform: ModPlatform) -> SelectionState {
    SelectionState {
        vst3: inventory.vst3.clone(),
        clap: inventory.clap.clone(),
        mod_audio: mod_selection(inventory, platform),
    }
}

/// Move the MOD Audio selection to `platform`, leaving VST3 and CLAP alone
pub fn switch_platform(
    selection: &SelectionState,
    inventory: &PluginInventory,
    platform: ModPlatform,
) -> SelectionState {
    SelectionState {
        vst3: selection.vst3.clone(),
        clap: selection.clap.clone(),
        mod_audio: mod_selection(inventory, platform),
    }
}

fn mod_selection(inventory: &PluginInventory, platform: ModPlatform) -> ModPlugins {
    match inventory.visible(PluginFormat::ModAudio, platform) {
        Some(plugins) => ModPlugins::only(platform, plugins.clone()),
        None => ModPlugins::default(),
    }
}

/// Drop every selected name that is not in `inventory`
pub fn prune(selection: &SelectionState, inventory: &PluginInventory) -> SelectionState {
    let keep = |selected: &PluginSet, available: Option<&PluginSet>| -> PluginSet {
        match available {
            Some(available) => selected
                .iter()
                .filter(|name| available.contains(name.as_str()))
                .cloned()
                .collect(),
            None => PluginSet::new(),
        }
    };

    let mut mod_audio = ModPlugins::default();
    for platform in ModPlatform::ALL {
        *mod_audio.get_mut(platform) = keep(
            selection.mod_audio.get(platform),
            inventory.visible(PluginFormat::ModAudio, platform),
        );
    }

    SelectionState {
        vst3: keep(&selection.vst3, Some(&inventory.vst3)),
        clap: keep(&selection.clap, Some(&inventory.clap)),
        mod_audio,
    }
}

/// Replace the selection of `format` with `names`, ignoring names outside the inventory.
///
/// Returns true if the selection changed.
pub fn set_selected(
    selection: &mut SelectionState,
    inventory: &PluginInventory,
    format: PluginFormat,
    platform: ModPlatform,
    names: &[String],
) -> bool {
    let chosen: PluginSet = names
        .iter()
        .filter(|name| inventory.contains(format, platform, name))
        .cloned()
        .collect();

    let current = selection.plugins_mut(format, platform);
    if *current == chosen {
        return false;
    }
    *current = chosen;
    true
}

/// Flip one name in or out of the selection. Names outside the inventory are ignored.
pub fn toggle(
    selection: &mut SelectionState,
    inventory: &PluginInventory,
    format: PluginFormat,
    platform: ModPlatform,
    name: &str,
) -> bool {
    if !inventory.contains(format, platform, name) {
        return false;
    }

    let current = selection.plugins_mut(format, platform);
    if !current.shift_remove(name) {
        current.insert(name.to_string());
    }
    true
}

pub fn select_all(
    selection: &mut SelectionState,
    inventory: &PluginInventory,
    format: PluginFormat,
    platform: ModPlatform,
) -> bool {
    let all: Vec<String> = inventory
        .visible(format, platform)
        .map(|plugins| plugins.iter().cloned().collect())
        .unwrap_or_default();
    set_selected(selection, inventory, format, platform, &all)
}

pub fn clear(selection: &mut SelectionState, format: PluginFormat, platform: ModPlatform) -> bool {
    let current = selection.plugins_mut(format, platform);
    if current.is_empty() {
        return false;
    }
    current.clear();
    true
}
