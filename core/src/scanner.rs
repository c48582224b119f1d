use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use db::Db;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use utilities::{display_name, is_ignored_logical_path, logical_path, FileSystem};

use crate::watcher::DirectoryWatcher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanIssue {
    pub path: String,
    pub message: String,
}

/// What one walk observed. Errors are collected rather than returned so one
/// bad subtree never stops its siblings from being indexed.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub directories_watched: usize,
    pub files_added: usize,
    /// Every logical file path the walk visited, indexed before or not.
    pub seen: HashSet<String>,
    /// Directories whose contents could not be confirmed (unreadable or
    /// unwatchable). Records beneath them must not be pruned.
    pub incomplete: Vec<String>,
    pub issues: Vec<ScanIssue>,
    pub store_errors: usize,
}

impl ScanReport {
    fn issue(&mut self, path: &str, message: String) {
        self.issues.push(ScanIssue {
            path: path.to_string(),
            message,
        });
    }
}

/// Recursive pre-order walk that registers directories for watching and seeds
/// the record store with the regular files it finds.
pub struct TreeScanner {
    root: PathBuf,
    ignore_patterns: Vec<String>,
    fs: Arc<dyn FileSystem>,
}

impl TreeScanner {
    pub fn new(root: PathBuf, ignore_patterns: Vec<String>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root,
            ignore_patterns,
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logical_path(&self, path: &Path) -> Option<String> {
        logical_path(&self.root, path)
    }

    pub fn is_ignored(&self, logical: &str) -> bool {
        is_ignored_logical_path(logical, &self.ignore_patterns)
    }

    /// Walk `start`, registering every directory with `watcher` (when given) and
    /// inserting every regular file not yet indexed.
    ///
    /// Blocking: call it from `spawn_blocking` or a plain thread. The store is
    /// locked once per file, so readers get in between inserts.
    pub fn scan_and_register<'w>(
        &self,
        start: &Path,
        mut watcher: Option<&mut (dyn DirectoryWatcher + 'w)>,
        db: &Mutex<Db>,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        let mut stack = vec![start.to_path_buf()];

        while let Some(path) = stack.pop() {
            let Some(logical) = self.logical_path(&path) else {
                warn!(
                    "Path {} not under root {}; skipping",
                    path.display(),
                    self.root.display()
                );
                continue;
            };
            if self.is_ignored(&logical) {
                debug!("Skipping ignored path {logical}");
                continue;
            }

            let md = match self.fs.metadata(&path) {
                Ok(md) => md,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} vanished during scan", path.display());
                    continue;
                }
                Err(e) => {
                    warn!("Failed to stat {}: {e}", path.display());
                    report.issue(&logical, e.to_string());
                    report.incomplete.push(logical);
                    continue;
                }
            };

            if md.is_file {
                self.index_file(db, &path, logical, &mut report);
                continue;
            }
            if !md.is_dir {
                continue;
            }

            if let Some(w) = watcher.as_deref_mut() {
                if let Err(e) = w.register_directory(&path) {
                    warn!("Not watching {}: {e:#}", path.display());
                    report.issue(&logical, format!("{e:#}"));
                    report.incomplete.push(logical);
                    continue;
                }
                report.directories_watched += 1;
            }

            let entries = match self.fs.read_dir(&path) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} vanished during scan", path.display());
                    continue;
                }
                Err(e) => {
                    warn!("Failed to list {}: {e}", path.display());
                    report.issue(&logical, e.to_string());
                    report.incomplete.push(logical);
                    continue;
                }
            };

            // Reverse so the stack pops children in listing order.
            for entry in entries.into_iter().rev() {
                if entry.metadata.is_dir || entry.metadata.is_file {
                    stack.push(entry.path);
                }
            }
        }

        report
    }

    fn index_file(&self, db: &Mutex<Db>, path: &Path, logical: String, report: &mut ScanReport) {
        let name = display_name(path);
        let inserted = db.blocking_lock().insert_if_absent(&logical, &name);
        match inserted {
            Ok(Some(_)) => {
                info!("[file-index-add] {logical}");
                report.files_added += 1;
            }
            Ok(None) => {}
            Err(e) => {
                error!("Failed to index {logical}: {e}");
                report.store_errors += 1;
                report.issue(&logical, e.to_string());
            }
        }
        report.seen.insert(logical);
    }
}
