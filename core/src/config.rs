use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use models::{AppConfig, WatchErrorPolicy};
use std::path::{Path, PathBuf};
use utilities::{is_ignored_logical_path, logical_path};

/// Files SQLite keeps next to the database while it is open.
const DB_SIDE_SUFFIXES: [&str; 4] = ["", "-journal", "-wal", "-shm"];

#[derive(Debug, Parser)]
#[command(
    name = "treeindex",
    version,
    about = "Keeps a SQLite index of every file under a directory tree"
)]
pub struct Cli {
    /// Directory tree to index
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML config file; flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite DB (default: <root>/.treeindex/index.db)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Path to the log file (default: <root>/.treeindex/treeindex.log)
    #[arg(long, global = true)]
    pub log_path: Option<PathBuf>,

    /// Glob of root-relative paths to skip; repeatable
    #[arg(long = "ignore", value_name = "GLOB", global = true)]
    pub ignore: Vec<String>,

    /// Walk the whole tree again after any watch error
    #[arg(long, global = true)]
    pub rescan_on_watch_error: bool,

    /// Full rescan every N seconds (0 disables)
    #[arg(long, global = true)]
    pub rescan_interval_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index the tree and keep it in sync until interrupted (default)
    Run,
    /// Scan once, prune stale records, and exit
    Scan(ScanArgs),
    /// Print what the index currently holds
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// List the files under this logical directory (e.g. "/docs")
    #[arg(long)]
    pub prefix: Option<String>,
}

impl Cli {
    /// Config file first, then flags on top.
    pub fn resolve_app_config(&self) -> Result<AppConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_config_file(path)?,
            None => {
                let Some(root) = &self.root else {
                    bail!("either --root or --config is required");
                };
                AppConfig::new(root.clone())
            }
        };

        if let Some(root) = &self.root {
            cfg.root_path = root.clone();
        }
        if let Some(db_path) = &self.db_path {
            cfg.db_path = Some(db_path.clone());
        }
        if let Some(log_path) = &self.log_path {
            cfg.log_path = Some(log_path.clone());
        }
        for pattern in &self.ignore {
            if !cfg.ignore_patterns.contains(pattern) {
                cfg.ignore_patterns.push(pattern.clone());
            }
        }
        if self.rescan_on_watch_error {
            cfg.watch_error_policy = WatchErrorPolicy::Rescan;
        }
        if let Some(secs) = self.rescan_interval_secs {
            cfg.rescan_interval_secs = secs;
        }
        Ok(cfg)
    }
}

pub fn load_config_file(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

/// The root must be an existing directory; it is replaced by its canonical
/// absolute form so event paths strip cleanly. A database or log placed
/// inside the root is added to the ignore patterns.
pub fn validate_app_config(cfg: &mut AppConfig) -> Result<()> {
    let root = cfg
        .root_path
        .canonicalize()
        .with_context(|| format!("root {} is not accessible", cfg.root_path.display()))?;
    if !root.is_dir() {
        bail!("root {} is not a directory", root.display());
    }
    cfg.root_path = root;
    ignore_own_files(cfg)
}

fn ignore_own_files(cfg: &mut AppConfig) -> Result<()> {
    let mut own = Vec::new();
    let db_path = absolute(&cfg.resolved_db_path())?;
    if let Some(db) = logical_path(&cfg.root_path, &db_path) {
        own.extend(DB_SIDE_SUFFIXES.iter().map(|suffix| format!("{db}{suffix}")));
    }
    let log_path = absolute(&cfg.resolved_log_path())?;
    own.extend(logical_path(&cfg.root_path, &log_path));

    for path in own {
        if path != "/" && !is_ignored_logical_path(&path, &cfg.ignore_patterns) {
            cfg.ignore_patterns.push(path);
        }
    }
    Ok(())
}

/// Absolute form of `path` with its parent resolved through symlinks, so it
/// lines up with the canonical root. The file itself need not exist yet.
fn absolute(path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("failed to resolve the working directory")?
            .join(path)
    };
    let resolved = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent.canonicalize().ok().map(|p| p.join(name)),
        _ => None,
    };
    Ok(resolved.unwrap_or(path))
}
