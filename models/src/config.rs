use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directory under the watched root that holds the index database and log.
pub const DEFAULT_STATE_DIR: &str = ".treeindex";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Absolute path of the tree being indexed.
    pub root_path: PathBuf,
    /// SQLite database; defaults to `<root>/.treeindex/index.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Log file; defaults to `<root>/.treeindex/treeindex.log`.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Globs over logical paths. A bare name matches at any depth; a pattern
    /// with a `/` is anchored at the root.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub watch_error_policy: WatchErrorPolicy,
    /// Periodic full rescan; 0 disables it.
    #[serde(default)]
    pub rescan_interval_secs: u64,
}

impl AppConfig {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            db_path: None,
            log_path: None,
            ignore_patterns: default_ignore_patterns(),
            watch_error_policy: WatchErrorPolicy::default(),
            rescan_interval_secs: 0,
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root_path.join(DEFAULT_STATE_DIR)
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("index.db"))
    }

    pub fn resolved_log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("treeindex.log"))
    }
}

/// What the reconciler does after the watch backend reports an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchErrorPolicy {
    /// Log it and keep going; the health signal reports the error.
    #[default]
    #[serde(rename = "log", alias = "log-only", alias = "log_only")]
    LogOnly,
    /// Log it, then walk the whole tree again to repair drift.
    #[serde(rename = "rescan")]
    Rescan,
}

pub fn default_ignore_patterns() -> Vec<String> {
    vec![
        DEFAULT_STATE_DIR.to_string(),
        format!("{DEFAULT_STATE_DIR}/*"),
    ]
}
