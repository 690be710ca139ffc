use crate::models::config::Settings;
use crate::models::plugins::{
    ModPlatform, Mode, PluginFolders, PluginFormat, PluginInventory, SelectionState,
};
use std::collections::HashMap;

/// Plugins with a delete request in flight.
///
/// Keyed by format and name so that removing `dm-Stutter` as VST3 and as CLAP at the
/// same time are tracked independently. Each entry remembers the MOD platform that was
/// active when the request was sent. Entries are added and removed by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalTracker {
    pending: HashMap<(PluginFormat, String), ModPlatform>,
}

impl RemovalTracker {
    /// Returns false if the plugin was already being removed
    pub fn insert(&mut self, format: PluginFormat, name: &str, platform: ModPlatform) -> bool {
        let key = (format, name.to_string());
        if self.pending.contains_key(&key) {
            return false;
        }
        self.pending.insert(key, platform);
        true
    }

    /// Stop tracking, returning the platform the removal was started on
    pub fn remove(&mut self, format: PluginFormat, name: &str) -> Option<ModPlatform> {
        self.pending.remove(&(format, name.to_string()))
    }

    pub fn contains(&self, format: PluginFormat, name: &str) -> bool {
        self.pending.contains_key(&(format, name.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Everything a fetch needs, captured at the moment the fetch was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub mode: Mode,
    pub formats: Vec<PluginFormat>,
    pub folders: PluginFolders,
    pub platform: ModPlatform,
}

impl FetchRequest {
    pub fn wants(&self, format: PluginFormat) -> bool {
        self.formats.contains(&format)
    }
}

/// State of one synchronization session.
///
/// Held by [`StateManager`](crate::state::StateManager); the controller never keeps
/// its own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub mode: Mode,
    pub formats: Vec<PluginFormat>,
    pub folders: PluginFolders,
    pub active_platform: ModPlatform,

    // Last fetched inventory and the user's subset of it
    pub inventory: PluginInventory,
    pub selection: SelectionState,
    pub removals: RemovalTracker,

    // Activity
    pub is_fetching: bool,
    pub is_processing: bool,
    pub mod_disconnected: bool,

    /// Ticket of the most recently issued fetch
    pub fetch_seq: u64,
    pub last_error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            formats: PluginFormat::ALL.to_vec(),
            folders: PluginFolders::default(),
            active_platform: ModPlatform::default(),
            inventory: PluginInventory::default(),
            selection: SelectionState::default(),
            removals: RemovalTracker::default(),
            is_fetching: false,
            is_processing: false,
            mod_disconnected: false,
            fetch_seq: 0,
            last_error: None,
        }
    }
}

impl SessionState {
    /// Start a session from persisted settings
    pub fn from_settings(settings: &Settings) -> Self {
        let mut formats = settings.session.formats.clone();
        formats.sort();
        formats.dedup();

        Self {
            formats,
            folders: settings.folders.clone(),
            active_platform: settings.session.mod_platform,
            ..Self::default()
        }
    }

    pub fn fetch_request(&self) -> FetchRequest {
        FetchRequest {
            mode: self.mode,
            formats: self.formats.clone(),
            folders: self.folders.clone(),
            platform: self.active_platform,
        }
    }

    /// A bulk operation is running or a removal is in flight
    pub fn is_busy(&self) -> bool {
        self.is_processing || !self.removals.is_empty()
    }

    pub fn wants(&self, format: PluginFormat) -> bool {
        self.formats.contains(&format)
    }
}
