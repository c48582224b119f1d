pub mod config;
pub mod engine;
pub mod index;
pub mod monitoring;
pub mod reconciler;
pub mod scanner;
pub mod watcher;

pub use engine::{Engine, FileIndexHandle};
pub use index::FileIndex;
pub use reconciler::{EventOutcome, IndexCommand, Reconciler, ScanSummary};
pub use scanner::{ScanIssue, ScanReport, TreeScanner};
pub use watcher::{
    watch_channels, DirectoryWatcher, NotifyWatcher, RecordingWatcher, WatchError, WatchSenders,
    WatchStreams,
};
