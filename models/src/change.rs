use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One regular file known to the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub id: i64,
    pub path: String, // root-relative, always starts with '/'
    pub name: String, // last path segment
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventKind {
    Create,
    Remove,
    Rename,
    Write,
    Chmod,
    Other,
}

impl WatchEventKind {
    /// Rename and remove are reconciled the same way: the old path is gone.
    pub fn is_removal(self) -> bool {
        matches!(self, WatchEventKind::Remove | WatchEventKind::Rename)
    }
}

/// A single change notification for an absolute filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
