use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use db::Db;
use models::{AppConfig, IndexHealth, IndexState, WatchErrorPolicy, WatchEvent, WatchEventKind};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task;
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use utilities::{display_name, retry_metadata, FileSystem};

use crate::scanner::{ScanIssue, ScanReport, TreeScanner};
use crate::watcher::{DirectoryWatcher, WatchError, WatchStreams};

const STAT_RETRY_ATTEMPTS: usize = 3;
const STAT_RETRY_DELAY_MS: u64 = 50;

/// Requests handled inside the reconciler task, so they never race its writes.
#[derive(Debug)]
pub enum IndexCommand {
    Rescan(oneshot::Sender<ScanSummary>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub files_added: usize,
    pub files_removed: usize,
    pub directories_watched: usize,
    pub issues: Vec<ScanIssue>,
}

/// What applying a single event did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Kind carries no path change, or the path is ignored or outside the root.
    Ignored,
    /// Create for a path that was gone by the time it was inspected.
    Vanished,
    Added(usize),
    Removed(usize),
    /// Nothing to do: already indexed, or nothing stored at or under the path.
    Unchanged,
    /// The store rejected the operation or the walk died; the next full scan
    /// repairs it.
    Failed,
}

/// Single consumer of the watch streams and the only writer to the index once
/// started.
pub struct Reconciler {
    scanner: Arc<TreeScanner>,
    fs: Arc<dyn FileSystem>,
    db: Arc<Mutex<Db>>,
    watcher: Option<Box<dyn DirectoryWatcher>>,
    health: watch::Sender<IndexHealth>,
    policy: WatchErrorPolicy,
    rescan_interval: Option<Duration>,
}

impl Reconciler {
    /// Without a watcher the reconciler only scans; nothing gets registered.
    pub fn new(
        cfg: &AppConfig,
        fs: Arc<dyn FileSystem>,
        db: Arc<Mutex<Db>>,
        watcher: Option<Box<dyn DirectoryWatcher>>,
    ) -> (Self, watch::Receiver<IndexHealth>) {
        let (health, health_rx) = watch::channel(IndexHealth::default());
        let scanner = Arc::new(TreeScanner::new(
            cfg.root_path.clone(),
            cfg.ignore_patterns.clone(),
            Arc::clone(&fs),
        ));
        let rescan_interval = match cfg.rescan_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let reconciler = Self {
            scanner,
            fs,
            db,
            watcher,
            health,
            policy: cfg.watch_error_policy,
            rescan_interval,
        };
        (reconciler, health_rx)
    }

    fn record(&self, update: impl FnOnce(&mut IndexHealth)) {
        self.health.send_modify(update);
    }

    fn record_store_error(&self, message: String) {
        self.record(|h| {
            h.store_errors += 1;
            h.last_error = Some(message);
            h.state = IndexState::Degraded;
        });
    }

    fn record_failure(&self, message: String) {
        self.record(|h| {
            h.last_error = Some(message);
            h.state = IndexState::Degraded;
        });
    }

    /// Run a walk on the blocking pool. The watcher moves into the walk and
    /// comes back with the report; the store is only locked per insert.
    async fn walk(&mut self, start: PathBuf) -> Option<ScanReport> {
        let scanner = Arc::clone(&self.scanner);
        let db = Arc::clone(&self.db);
        let mut watcher = self.watcher.take();
        let walked = task::spawn_blocking(move || {
            let report = scanner.scan_and_register(&start, watcher.as_deref_mut(), &db);
            (report, watcher)
        })
        .await;

        match walked {
            Ok((report, watcher)) => {
                self.watcher = watcher;
                Some(report)
            }
            Err(e) => {
                // The watcher went down with the task; nothing new gets registered.
                error!("Scan task failed: {e}");
                self.record_failure(format!("scan task failed: {e}"));
                None
            }
        }
    }

    /// Apply one watch event to the index.
    pub async fn apply(&mut self, event: WatchEvent) -> EventOutcome {
        let Some(logical) = self.scanner.logical_path(&event.path) else {
            warn!(
                "Event for {} outside root {}; skipping",
                event.path.display(),
                self.scanner.root().display()
            );
            return EventOutcome::Ignored;
        };
        if self.scanner.is_ignored(&logical) {
            return EventOutcome::Ignored;
        }

        let outcome = match event.kind {
            kind if kind.is_removal() => self.remove(&logical).await,
            WatchEventKind::Create => self.create(&event.path, logical).await,
            // Write, chmod and the rest never change which files exist.
            _ => return EventOutcome::Ignored,
        };

        self.record(|h| {
            h.events_applied += 1;
            match outcome {
                EventOutcome::Added(n) => h.files_added += n as u64,
                EventOutcome::Removed(n) => h.files_removed += n as u64,
                _ => {}
            }
        });
        outcome
    }

    /// Exact match first; otherwise the path was a directory and everything
    /// beneath it goes.
    async fn remove(&mut self, logical: &str) -> EventOutcome {
        let db = Arc::clone(&self.db);
        let db = db.lock().await;

        let exact = match db.exists_by_path(logical) {
            Ok(exact) => exact,
            Err(e) => {
                error!("Failed to look up {logical}: {e}");
                self.record_store_error(e.to_string());
                return EventOutcome::Failed;
            }
        };

        let result = if exact {
            db.delete_by_path(logical)
        } else {
            db.delete_by_prefix(logical)
        };
        match result {
            Ok(0) => {
                debug!("Nothing indexed at or under {logical}");
                EventOutcome::Unchanged
            }
            Ok(n) => {
                if exact {
                    info!("[file-index-del] {logical}");
                } else {
                    info!("[file-index-del] {logical}/ ({n} records)");
                }
                EventOutcome::Removed(n)
            }
            Err(e) => {
                error!("Failed to delete {logical}: {e}");
                self.record_store_error(e.to_string());
                EventOutcome::Failed
            }
        }
    }

    async fn create(&mut self, path: &Path, logical: String) -> EventOutcome {
        // Retries sleep between attempts, so keep them off the async workers.
        let fs = Arc::clone(&self.fs);
        let target = path.to_path_buf();
        let stat = task::spawn_blocking(move || {
            retry_metadata(
                fs.as_ref(),
                &target,
                STAT_RETRY_ATTEMPTS,
                STAT_RETRY_DELAY_MS,
            )
        })
        .await;
        let md = match stat {
            Ok(Ok(md)) => md,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("{} vanished before it could be indexed", path.display());
                return EventOutcome::Vanished;
            }
            Ok(Err(e)) => {
                warn!("Failed to stat {}: {e}", path.display());
                return EventOutcome::Unchanged;
            }
            Err(e) => {
                error!("Stat task for {} failed: {e}", path.display());
                return EventOutcome::Unchanged;
            }
        };

        if md.is_dir {
            let Some(report) = self.walk(path.to_path_buf()).await else {
                return EventOutcome::Failed;
            };
            if report.store_errors > 0 {
                self.record_store_error(format!(
                    "{} store errors while adopting {logical}",
                    report.store_errors
                ));
            }
            return match report.files_added {
                0 => EventOutcome::Unchanged,
                n => EventOutcome::Added(n),
            };
        }
        if !md.is_file {
            return EventOutcome::Ignored;
        }

        let inserted = self
            .db
            .lock()
            .await
            .insert_if_absent(&logical, &display_name(path));
        match inserted {
            Ok(Some(_)) => {
                info!("[file-index-add] {logical}");
                EventOutcome::Added(1)
            }
            Ok(None) => EventOutcome::Unchanged,
            Err(e) => {
                error!("Failed to index {logical}: {e}");
                self.record_store_error(e.to_string());
                EventOutcome::Failed
            }
        }
    }

    /// Walk the whole tree, re-register every directory and drop records for
    /// files that are no longer there.
    pub async fn full_rescan(&mut self) -> ScanSummary {
        self.record(|h| h.state = IndexState::Scanning);
        let root = self.scanner.root().to_path_buf();

        match self.fs.metadata(&root) {
            Ok(md) if md.is_dir => {}
            Ok(_) => {
                let message = format!("root {} is not a directory", root.display());
                error!("{message}; skipping scan");
                self.record_failure(message);
                return ScanSummary::default();
            }
            Err(e) => {
                // Pruning against an unreachable root would empty the index.
                let message = format!("root {} unavailable: {e}", root.display());
                error!("{message}; skipping scan");
                self.record_failure(message);
                return ScanSummary::default();
            }
        }

        info!("Scanning {}", root.display());
        let Some(report) = self.walk(root).await else {
            return ScanSummary::default();
        };

        let mut store_errors = report.store_errors;
        let pruned = self
            .db
            .lock()
            .await
            .delete_unseen(&report.seen, &report.incomplete);
        let removed = match pruned {
            Ok(removed) => removed,
            Err(e) => {
                error!("Failed to prune stale records: {e}");
                store_errors += 1;
                Vec::new()
            }
        };
        for path in &removed {
            info!("[file-index-del] {path}");
        }

        let summary = ScanSummary {
            files_added: report.files_added,
            files_removed: removed.len(),
            directories_watched: report.directories_watched,
            issues: report.issues,
        };
        info!(
            "Scan finished: {} added, {} removed, {} directories watched, {} issues",
            summary.files_added,
            summary.files_removed,
            summary.directories_watched,
            summary.issues.len()
        );

        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.record(|h| {
            h.files_added += summary.files_added as u64;
            h.files_removed += summary.files_removed as u64;
            h.last_scan_at = Some(now);
            if store_errors > 0 {
                h.store_errors += store_errors as u64;
                h.last_error = Some(format!("{store_errors} store errors during scan"));
                h.state = IndexState::Degraded;
            } else {
                h.state = IndexState::Live;
            }
        });
        summary
    }

    pub async fn handle_watch_error(&mut self, err: WatchError) {
        error!("Watch error: {err}");
        let message = err.to_string();
        self.record(|h| {
            h.watch_errors += 1;
            h.last_error = Some(message);
            h.state = IndexState::Degraded;
        });

        if err.needs_rescan || self.policy == WatchErrorPolicy::Rescan {
            info!("Rescanning after watch error");
            self.full_rescan().await;
        }
    }

    /// Drain events until cancelled or until the event stream closes. The
    /// watcher is dropped on exit, releasing its OS handles.
    pub async fn run(
        mut self,
        mut streams: WatchStreams,
        mut commands: mpsc::Receiver<IndexCommand>,
        token: CancellationToken,
    ) {
        let mut ticker = self.rescan_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        let mut errors_open = true;
        let mut commands_open = true;

        self.record(|h| {
            if h.state != IndexState::Degraded {
                h.state = IndexState::Live;
            }
        });
        info!("Reconciler running");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Reconciler cancellation requested");
                    break;
                }
                maybe_event = streams.events.recv() => {
                    let Some(event) = maybe_event else {
                        warn!("Watch event stream closed");
                        break;
                    };
                    self.apply(event).await;
                }
                maybe_err = streams.errors.recv(), if errors_open => {
                    match maybe_err {
                        Some(err) => self.handle_watch_error(err).await,
                        None => errors_open = false,
                    }
                }
                maybe_cmd = commands.recv(), if commands_open => {
                    match maybe_cmd {
                        Some(IndexCommand::Rescan(reply)) => {
                            let summary = self.full_rescan().await;
                            let _ = reply.send(summary);
                        }
                        None => commands_open = false,
                    }
                }
                _ = next_tick(&mut ticker) => {
                    info!("Periodic rescan");
                    self.full_rescan().await;
                }
            }
        }

        self.record(|h| h.state = IndexState::Stopped);
        drop(self.watcher);
        info!("Reconciler stopped");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
