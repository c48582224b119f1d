use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Starting,
    Scanning,
    Live,
    /// Still running, but the watch backend or the store reported an error
    /// since the last full scan. A rescan returns the index to `Live`.
    Degraded,
    Stopped,
}

/// Liveness snapshot published by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHealth {
    pub state: IndexState,
    pub events_applied: u64,
    pub files_added: u64,
    pub files_removed: u64,
    pub watch_errors: u64,
    pub store_errors: u64,
    pub last_error: Option<String>,
    pub last_scan_at: Option<i64>, // unix timestamp
}

impl Default for IndexHealth {
    fn default() -> Self {
        Self {
            state: IndexState::Starting,
            events_applied: 0,
            files_added: 0,
            files_removed: 0,
            watch_errors: 0,
            store_errors: 0,
            last_error: None,
            last_scan_at: None,
        }
    }
}
