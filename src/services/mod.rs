//! Services module - the synchronization workflow without any front end.
//!
//! # Components
//!
//! - [`RemoteTransport`]: list, create and delete plugins. [`DeviceTransport`] is the
//!   production implementation, built from:
//!   - [`RemoteShell`] / [`SshShell`]: commands on the MOD device
//!   - [`ReleaseSource`] / [`GithubReleases`]: release archives of each plugin
//!   - [`folders`]: local VST3 and CLAP install folders
//! - [`InventoryFetcher`]: one fetch, normalized and with device reachability folded in
//! - [`reconcile`]: pure selection functions (fresh fetch, platform switch, pruning, user edits)
//! - [`BulkExecutor`]: create and delete calls with failure classification
//! - [`ArchivePackager`]: picked bundle folders to a zip payload
//!
//! Errors are split the way the user sees them: [`SyncError::DeviceUnreachable`] offers a
//! reconnect, [`SyncError::Operation`] is reported and nothing else changes, and
//! [`ValidationError`] never leaves this machine.

pub mod archive;
pub mod device;
pub mod executor;
pub mod folders;
pub mod inventory;
pub mod reconcile;
pub mod releases;
pub mod shell;
pub mod ssh;
pub mod transport;

pub use archive::{ArchiveEntry, ArchivePackager, PackagedArchive, ValidationError};
pub use device::DeviceTransport;
pub use executor::BulkExecutor;
pub use inventory::InventoryFetcher;
pub use releases::{DesktopOs, GithubReleases, ReleaseSource, ReleaseTarget};
pub use shell::{RemoteShell, ShellError};
pub use ssh::SshShell;
pub use transport::{RemoteTransport, SyncError, TransportError};
