// State management module
//
// This module provides the StateManager which wraps SessionState with thread-safe access
// using Arc<RwLock<T>> and emits change events for front ends.

use crate::models::{
    FetchRequest, ModPlatform, Mode, PluginFormat, PluginInventory, SelectionState, SessionState,
};
use crate::services::reconcile;
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Severity of a user-facing notification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// Change events emitted when state is modified
///
/// Front ends subscribe to these instead of polling the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    ModeChanged {
        mode: Mode,
    },

    FormatsChanged {
        formats: Vec<PluginFormat>,
    },

    PlatformChanged {
        platform: ModPlatform,
    },

    /// A VST3 or CLAP folder override was set or cleared
    FoldersChanged,

    FetchStarted {
        seq: u64,
    },

    FetchFinished {
        seq: u64,
    },

    /// The displayed inventory was replaced or changed by a confirmed delta
    InventoryChanged {
        total: usize,
    },

    SelectionChanged {
        selected: usize,
    },

    ConnectivityChanged {
        mod_disconnected: bool,
    },

    ProcessingChanged {
        is_processing: bool,
    },

    RemovalStarted {
        format: PluginFormat,
        name: String,
    },

    RemovalFinished {
        format: PluginFormat,
        name: String,
        removed: bool,
    },

    Notification {
        level: NotificationLevel,
        message: String,
    },
}

/// Events a subscriber can fall behind by before it starts missing them
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Most events a single per-plugin removal emits: started, connectivity,
/// inventory, selection, finished and its notification
pub const EVENTS_PER_REMOVAL: usize = 6;

/// Channel capacity that holds every event of `removals` concurrent removals
pub fn event_capacity_for(removals: usize) -> usize {
    DEFAULT_EVENT_CAPACITY + removals * EVENTS_PER_REMOVAL
}

/// Proof that a fetch was issued, used to discard responses that were superseded
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub request: FetchRequest,
    /// Keep the VST3 and CLAP selection instead of reselecting everything
    pub keep_selection: bool,
}

/// Thread-safe state manager with event emission
///
/// Holds the [`SessionState`] of one synchronization session:
/// - [`read()`](Self::read) and [`snapshot()`](Self::snapshot) for reading
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// The workflow methods below are the only places where the inventory and the
/// selection change, so the selection always stays a subset of the inventory.
pub struct StateManager {
    state: Arc<RwLock<SessionState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    pub fn new() -> Self {
        Self::with_state(SessionState::default())
    }

    pub fn with_state(state: SessionState) -> Self {
        Self::with_capacity(state, DEFAULT_EVENT_CAPACITY)
    }

    /// Like [`with_state`](Self::with_state), buffering up to `capacity` unread
    /// events per subscriber. See [`event_capacity_for`].
    pub fn with_capacity(state: SessionState, capacity: usize) -> Self {
        let (state_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Arc::new(RwLock::new(state)),
            state_tx,
        }
    }

    /// Get a clone of the current state
    pub fn snapshot(&self) -> SessionState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_busy());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, and emits one event per
    /// detected change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);
        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, change: StateChange, changes: &mut Vec<StateChange>) {
        let _ = self.state_tx.send(change.clone());
        changes.push(change);
    }

    fn detect_changes(&self, old: &SessionState, new: &SessionState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.mode != new.mode {
            changes.push(StateChange::ModeChanged { mode: new.mode });
        }

        if old.formats != new.formats {
            changes.push(StateChange::FormatsChanged {
                formats: new.formats.clone(),
            });
        }

        if old.active_platform != new.active_platform {
            changes.push(StateChange::PlatformChanged {
                platform: new.active_platform,
            });
        }

        if old.folders != new.folders {
            changes.push(StateChange::FoldersChanged);
        }

        if old.is_fetching != new.is_fetching {
            if new.is_fetching {
                changes.push(StateChange::FetchStarted { seq: new.fetch_seq });
            } else {
                changes.push(StateChange::FetchFinished { seq: new.fetch_seq });
            }
        }

        if old.inventory != new.inventory {
            let inventory = &new.inventory;
            changes.push(StateChange::InventoryChanged {
                total: inventory.vst3.len() + inventory.clap.len() + inventory.mod_audio.len(),
            });
        }

        if old.selection != new.selection {
            changes.push(StateChange::SelectionChanged {
                selected: new.selection.len(),
            });
        }

        if old.mod_disconnected != new.mod_disconnected {
            changes.push(StateChange::ConnectivityChanged {
                mod_disconnected: new.mod_disconnected,
            });
        }

        if old.is_processing != new.is_processing {
            changes.push(StateChange::ProcessingChanged {
                is_processing: new.is_processing,
            });
        }

        changes
    }

    // Session settings

    pub fn set_mode(&self, mode: Mode) -> Vec<StateChange> {
        self.update(|state| state.mode = mode)
    }

    pub fn set_formats(&self, formats: &[PluginFormat]) -> Vec<StateChange> {
        let mut formats = formats.to_vec();
        formats.sort();
        formats.dedup();
        self.update(|state| state.formats = formats)
    }

    /// Switch the active MOD platform, rebuilding only the MOD Audio selection
    pub fn switch_platform(&self, platform: ModPlatform) -> Vec<StateChange> {
        self.update(|state| {
            state.active_platform = platform;
            state.selection = reconcile::switch_platform(&state.selection, &state.inventory, platform);
        })
    }

    /// Set or clear a folder override. Returns true if the override changed.
    pub fn set_folder(&self, format: PluginFormat, folder: Option<Utf8PathBuf>) -> bool {
        let mut changed = false;
        self.update(|state| changed = state.folders.set(format, folder));
        changed
    }

    // Fetching

    /// Record a new fetch and return its ticket
    pub fn begin_fetch(&self) -> FetchTicket {
        self.issue_fetch(false)
    }

    /// Record a refetch after a platform switch.
    ///
    /// Completing it rebuilds only the MOD Audio selection; the VST3 and CLAP
    /// selection is kept, pruned against the new inventory.
    pub fn begin_platform_fetch(&self) -> FetchTicket {
        self.issue_fetch(true)
    }

    fn issue_fetch(&self, keep_selection: bool) -> FetchTicket {
        let mut ticket = None;
        self.update(|state| {
            state.fetch_seq += 1;
            state.is_fetching = true;
            state.mod_disconnected = false;
            state.last_error = None;
            ticket = Some(FetchTicket {
                seq: state.fetch_seq,
                request: state.fetch_request(),
                keep_selection,
            });
        });

        // The closure always runs
        ticket.unwrap_or_else(|| self.read(|state| FetchTicket {
            seq: state.fetch_seq,
            request: state.fetch_request(),
            keep_selection,
        }))
    }

    fn is_latest(&self, ticket: &FetchTicket) -> bool {
        self.read(|state| state.fetch_seq == ticket.seq)
    }

    /// Replace the inventory with a fetch result and reselect everything, or only
    /// MOD Audio for a [platform fetch](Self::begin_platform_fetch).
    ///
    /// Returns false, changing nothing, when a newer fetch has been issued since.
    pub fn complete_fetch(&self, ticket: &FetchTicket, inventory: PluginInventory) -> bool {
        let mut applied = false;
        self.update(|state| {
            if state.fetch_seq != ticket.seq {
                return;
            }
            let platform = state.active_platform;
            state.selection = if ticket.keep_selection {
                let kept = reconcile::prune(&state.selection, &inventory);
                reconcile::switch_platform(&kept, &inventory, platform)
            } else {
                reconcile::reconcile(&inventory, platform)
            };
            state.mod_disconnected = inventory.is_mod_disconnected();
            state.inventory = inventory;
            state.is_fetching = false;
            applied = true;
        });

        if !applied {
            tracing::warn!("Discarding stale fetch #{}", ticket.seq);
        }
        applied
    }

    /// Record a failed fetch. Stale failures are ignored.
    pub fn fail_fetch(&self, ticket: &FetchTicket, message: &str) -> bool {
        if !self.is_latest(ticket) {
            tracing::warn!("Discarding stale fetch failure #{}", ticket.seq);
            return false;
        }
        self.update(|state| {
            if state.fetch_seq == ticket.seq {
                state.is_fetching = false;
                state.last_error = Some(message.to_string());
            }
        });
        true
    }

    // User selection, always for the active MOD platform

    pub fn set_selected(&self, format: PluginFormat, names: &[String]) -> Vec<StateChange> {
        self.update(|state| {
            let platform = state.active_platform;
            reconcile::set_selected(&mut state.selection, &state.inventory, format, platform, names);
        })
    }

    pub fn toggle(&self, format: PluginFormat, name: &str) -> Vec<StateChange> {
        self.update(|state| {
            let platform = state.active_platform;
            reconcile::toggle(&mut state.selection, &state.inventory, format, platform, name);
        })
    }

    pub fn select_all(&self, format: PluginFormat) -> Vec<StateChange> {
        self.update(|state| {
            let platform = state.active_platform;
            reconcile::select_all(&mut state.selection, &state.inventory, format, platform);
        })
    }

    pub fn clear_selection(&self, format: PluginFormat) -> Vec<StateChange> {
        self.update(|state| {
            let platform = state.active_platform;
            reconcile::clear(&mut state.selection, format, platform);
        })
    }

    // Bulk operations

    /// Mark a bulk operation as running. Returns false if one already is.
    pub fn begin_processing(&self) -> bool {
        let mut started = false;
        self.update(|state| {
            if !state.is_processing {
                state.is_processing = true;
                state.mod_disconnected = false;
                started = true;
            }
        });
        started
    }

    pub fn finish_processing(&self) -> Vec<StateChange> {
        self.update(|state| state.is_processing = false)
    }

    /// Merge server-confirmed names into the displayed inventory, sorted and de-duplicated
    pub fn apply_created(&self, format: PluginFormat, names: &[String]) -> Vec<StateChange> {
        self.update(|state| {
            let platform = state.active_platform;
            let plugins = state.inventory.plugins_mut(format, platform);
            plugins.extend(names.iter().cloned());
            plugins.sort();
        })
    }

    /// [`apply_created`](Self::apply_created) for every format of a create result
    pub fn apply_created_selection(&self, created: &SelectionState) -> Vec<StateChange> {
        let platform = self.read(|state| state.active_platform);
        let mut changes = Vec::new();
        for format in PluginFormat::ALL {
            let names: Vec<String> = created.plugins(format, platform).iter().cloned().collect();
            if !names.is_empty() {
                changes.extend(self.apply_created(format, &names));
            }
        }
        changes
    }

    /// Track a delete request. Returns false if the plugin is already being removed.
    pub fn begin_removal(&self, format: PluginFormat, name: &str) -> bool {
        let mut started = false;
        let mut changes = self.update(|state| {
            started = state.removals.insert(format, name, state.active_platform);
            if started {
                state.mod_disconnected = false;
            }
        });

        if started {
            self.emit(
                StateChange::RemovalStarted {
                    format,
                    name: name.to_string(),
                },
                &mut changes,
            );
        }
        started
    }

    /// Stop tracking a delete request, pruning the plugin if it was removed.
    ///
    /// MOD Audio plugins are pruned from the platform that was active when the
    /// removal started, even if the user has switched since.
    pub fn finish_removal(&self, format: PluginFormat, name: &str, removed: bool) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            let started_on = state.removals.remove(format, name);
            if removed {
                let platform = started_on.unwrap_or(state.active_platform);
                state.inventory.plugins_mut(format, platform).shift_remove(name);
                state.selection = reconcile::prune(&state.selection, &state.inventory);
            }
        });

        self.emit(
            StateChange::RemovalFinished {
                format,
                name: name.to_string(),
                removed,
            },
            &mut changes,
        );
        changes
    }

    /// Remove every name of a successful bulk delete from inventory and selection
    pub fn apply_removed_selection(&self, removed: &SelectionState) -> Vec<StateChange> {
        self.update(|state| {
            for (format, platform, name) in removed.entries() {
                state.inventory.plugins_mut(format, platform).shift_remove(&name);
            }
            state.selection = reconcile::prune(&state.selection, &state.inventory);
        })
    }

    // Connectivity and notifications

    pub fn mark_disconnected(&self) -> Vec<StateChange> {
        self.update(|state| state.mod_disconnected = true)
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        let mut changes = if level == NotificationLevel::Error {
            let error = message.clone();
            self.update(|state| state.last_error = Some(error))
        } else {
            Vec::new()
        };

        self.emit(StateChange::Notification { level, message }, &mut changes);
        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
