// modsync - Install and uninstall VST3, CLAP and MOD Audio plugins
//
// This is the library crate containing the synchronization workflow and its data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod cli;
pub mod config;
pub mod controller;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use controller::SyncController;
pub use metrics::SyncMetrics;
pub use models::{
    Mode, ModPlatform, PluginFolders, PluginFormat, PluginInventory, SelectionState, SessionState,
    Settings,
};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
