//! Data models for modsync.
//!
//! - [`PluginInventory`] and [`SelectionState`]: what a fetch returned and what the user picked
//! - [`PluginFormat`], [`ModPlatform`], [`Mode`]: the axes of a session
//! - [`SessionState`]: the session held by [`StateManager`](crate::state::StateManager)
//! - [`Settings`]: user settings loaded from `Settings.yaml`

pub mod config;
pub mod plugins;
pub mod session_state;

pub use config::{DeviceSettings, PluginCatalog, ReleaseSettings, SessionSettings, Settings};
pub use plugins::{
    ModPlatform, ModPlugins, Mode, PluginFolders, PluginFormat, PluginInventory, PluginSet,
    SelectionState,
};
pub use session_state::{FetchRequest, RemovalTracker, SessionState};
