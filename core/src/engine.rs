use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use db::{Db, DbFactory, DiskDbFactory, MemoryDbFactory};
use models::{AppConfig, IndexHealth};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use utilities::{FileSystem, RealFileSystem};

use crate::index::FileIndex;
use crate::reconciler::{IndexCommand, Reconciler, ScanSummary};
use crate::watcher::{DirectoryWatcher, NotifyWatcher, WatchStreams};

const APP_BANNER: &str = r#"
 _                  _           _
| |_ _ __ ___  ___ (_)_ __   __| | _____  __
| __| '__/ _ \/ _ \| | '_ \ / _` |/ _ \ \/ /
| |_| | |  __/  __/| | | | | (_| |  __/>  <
 \__|_|  \___|\___||_|_| |_|\__,_|\___/_/\_\"#;

const SEPARATOR: &str = r#"---------------------------------------------"#;

const COMMAND_QUEUE: usize = 16;

pub struct Engine {
    cfg: AppConfig,
    db: Arc<Mutex<Db>>,
    fs: Arc<dyn FileSystem>,
}

impl Engine {
    /// Open (or create) the on-disk index for `cfg.root_path`.
    pub fn new(cfg: AppConfig) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());
        let db_path = cfg.resolved_db_path();
        if let Some(parent) = db_path.parent() {
            fs.create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let db = DiskDbFactory {
            path: db_path.clone(),
        }
        .create()
        .with_context(|| format!("failed to open index {}", db_path.display()))?;
        Ok(Self::with_fs_db(cfg, fs, db))
    }

    pub fn with_in_memory_db(cfg: AppConfig, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let db = MemoryDbFactory
            .create()
            .context("failed to open in-memory index")?;
        Ok(Self::with_fs_db(cfg, fs, db))
    }

    pub fn with_fs_db(cfg: AppConfig, fs: Arc<dyn FileSystem>, db: Db) -> Self {
        log_banner();
        info!("Indexing {}", cfg.root_path.display());
        Self {
            cfg,
            db: Arc::new(Mutex::new(db)),
            fs,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn index(&self) -> FileIndex {
        FileIndex::new(Arc::clone(&self.db))
    }

    /// Scan the tree with `watcher` already live, then hand the streams to a
    /// background reconciler. Events that arrive during the scan are queued and
    /// applied afterwards.
    pub async fn start(
        &self,
        watcher: Box<dyn DirectoryWatcher>,
        streams: WatchStreams,
        token: CancellationToken,
    ) -> Result<FileIndexHandle> {
        let (mut reconciler, health) = Reconciler::new(
            &self.cfg,
            Arc::clone(&self.fs),
            Arc::clone(&self.db),
            Some(watcher),
        );

        let summary = reconciler.full_rescan().await;
        info!(
            "Initial scan indexed {} new files and pruned {}",
            summary.files_added, summary.files_removed
        );

        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let token = token.child_token();
        let task = tokio::spawn(reconciler.run(streams, command_rx, token.clone()));

        Ok(FileIndexHandle {
            index: self.index(),
            commands,
            health,
            task,
            token,
        })
    }

    /// One full scan and prune without watching anything.
    pub async fn scan_once(&self) -> ScanSummary {
        let (mut reconciler, _health) =
            Reconciler::new(&self.cfg, Arc::clone(&self.fs), Arc::clone(&self.db), None);
        reconciler.full_rescan().await
    }

    pub async fn run(self) -> Result<()> {
        let token = CancellationToken::new();
        self.run_with_token(token).await
    }

    /// Watch with the OS backend until `token` is cancelled or Ctrl-C arrives.
    pub async fn run_with_token(self, token: CancellationToken) -> Result<()> {
        let (watcher, streams) = NotifyWatcher::new()?;
        let handle = self.start(Box::new(watcher), streams, token.clone()).await?;
        info!("Engine running");

        tokio::select! {
            _ = token.cancelled() => {
                info!("Engine cancellation requested");
            }
            res = tokio::signal::ctrl_c() => {
                match res {
                    Ok(()) => info!("Interrupted; shutting down"),
                    Err(e) => error!("Failed to listen for Ctrl-C: {e}"),
                }
            }
        }
        handle.shutdown().await
    }
}

/// Owner-side handle to a running reconciler.
pub struct FileIndexHandle {
    index: FileIndex,
    commands: mpsc::Sender<IndexCommand>,
    health: watch::Receiver<IndexHealth>,
    task: JoinHandle<()>,
    token: CancellationToken,
}

impl FileIndexHandle {
    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn health(&self) -> watch::Receiver<IndexHealth> {
        self.health.clone()
    }

    /// Ask the reconciler for a full rescan and wait until it finishes.
    pub async fn request_rescan(&self) -> Result<ScanSummary> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(IndexCommand::Rescan(reply))
            .await
            .map_err(|_| anyhow!("reconciler is not running"))?;
        rx.await
            .context("reconciler stopped before the rescan finished")
    }

    pub async fn shutdown(self) -> Result<()> {
        self.token.cancel();
        self.task.await.context("reconciler task failed")?;
        info!("Index stopped");
        Ok(())
    }
}

fn log_banner() {
    info!(
        "\n{}\n{}\n  name: {}\n  version: {}\n  author(s): {}\n{}\n",
        APP_BANNER,
        SEPARATOR,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_AUTHORS"),
        SEPARATOR
    );
}
