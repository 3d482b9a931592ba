//! Shared sync state types read by presentation surfaces.

use chrono::{DateTime, Utc};

/// Coarse sync state of the report cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing loaded yet
    #[default]
    Offline,
    Syncing,
    Synced,
    Error,
}

/// Sync state plus the details a UI needs to explain it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Message of the most recent failed reload, cleared on the next success
    pub last_error: Option<String>,
    /// When the cache was last replaced by a successful reload
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    pub(crate) fn syncing(&mut self) {
        self.state = SyncState::Syncing;
    }

    pub(crate) fn synced(&mut self, at: DateTime<Utc>) {
        self.state = SyncState::Synced;
        self.last_error = None;
        self.last_synced_at = Some(at);
    }

    pub(crate) fn failed(&mut self, message: String) {
        self.state = SyncState::Error;
        self.last_error = Some(message);
    }

    /// Whether the cache has ever been loaded successfully.
    pub const fn has_synced(&self) -> bool {
        self.last_synced_at.is_some()
    }

    /// Leave `Syncing` for the state the last finished reload left behind.
    /// Returns whether anything changed.
    pub(crate) fn settle(&mut self) -> bool {
        if self.state != SyncState::Syncing {
            return false;
        }
        self.state = if self.last_error.is_some() {
            SyncState::Error
        } else if self.has_synced() {
            SyncState::Synced
        } else {
            SyncState::Offline
        };
        true
    }
}
