use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use models::{WatchEvent, WatchEventKind};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

/// Registration side of the watch subsystem. Watches are non-recursive: every
/// directory that should produce events has to be registered on its own.
pub trait DirectoryWatcher: Send {
    fn register_directory(&mut self, path: &Path) -> Result<()>;
    fn is_watching(&self, path: &Path) -> bool;
    fn watched_count(&self) -> usize;
}

/// Failure reported by the OS watch backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchError {
    pub message: String,
    pub paths: Vec<PathBuf>,
    /// Events were dropped (e.g. kernel queue overflow); only a full walk can
    /// bring the index back in line.
    pub needs_rescan: bool,
}

impl WatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            paths: Vec::new(),
            needs_rescan: false,
        }
    }

    pub fn overflow(paths: Vec<PathBuf>) -> Self {
        Self {
            message: "watch backend dropped events".to_string(),
            paths,
            needs_rescan: true,
        }
    }
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.paths.is_empty() {
            let joined = self
                .paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ({joined})")?;
        }
        Ok(())
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        Self {
            message: e.to_string(),
            paths: e.paths,
            needs_rescan: false,
        }
    }
}

/// The two streams a watcher delivers: change events and backend errors.
pub struct WatchStreams {
    pub events: mpsc::UnboundedReceiver<WatchEvent>,
    pub errors: mpsc::UnboundedReceiver<WatchError>,
}

/// Sending halves matching [`WatchStreams`]; used by test doubles and by the
/// notify callback.
#[derive(Clone)]
pub struct WatchSenders {
    pub events: mpsc::UnboundedSender<WatchEvent>,
    pub errors: mpsc::UnboundedSender<WatchError>,
}

pub fn watch_channels() -> (WatchSenders, WatchStreams) {
    // Unbounded: the notify callback runs on the backend thread, which must
    // never block while a `watch()` call is waiting on it.
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    (
        WatchSenders {
            events: event_tx,
            errors: error_tx,
        },
        WatchStreams {
            events: event_rx,
            errors: error_rx,
        },
    )
}

/// `notify`-backed watcher. Dropping it releases the OS handles.
pub struct NotifyWatcher {
    inner: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl NotifyWatcher {
    pub fn new() -> Result<(Self, WatchStreams)> {
        let (senders, streams) = watch_channels();
        let inner = notify::recommended_watcher(move |res: notify::Result<Event>| {
            forward_notify_result(res, &senders)
        })
        .context("failed to create filesystem watcher")?;
        Ok((
            Self {
                inner,
                watched: HashSet::new(),
            },
            streams,
        ))
    }
}

impl DirectoryWatcher for NotifyWatcher {
    fn register_directory(&mut self, path: &Path) -> Result<()> {
        // Always hand the path to the backend: a directory deleted and
        // recreated under the same name needs a fresh OS watch.
        self.inner
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", path.display()))?;
        self.watched.insert(path.to_path_buf());
        Ok(())
    }

    fn is_watching(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }

    fn watched_count(&self) -> usize {
        self.watched.len()
    }
}

/// In-memory watcher that records registrations. Clones share state, so a
/// test can keep one handle after moving another into the reconciler.
#[derive(Debug, Clone, Default)]
pub struct RecordingWatcher {
    inner: Arc<Mutex<RecordingInner>>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    registered: Vec<PathBuf>,
    failing: HashSet<PathBuf>,
}

impl RecordingWatcher {
    /// Registration of any of `paths` fails with a permission error.
    pub fn failing_on(paths: &[&str]) -> Self {
        let watcher = Self::default();
        watcher
            .lock()
            .failing
            .extend(paths.iter().map(PathBuf::from));
        watcher
    }

    /// Registrations in call order, repeats included.
    pub fn registered(&self) -> Vec<PathBuf> {
        self.lock().registered.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RecordingInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DirectoryWatcher for RecordingWatcher {
    fn register_directory(&mut self, path: &Path) -> Result<()> {
        let mut inner = self.lock();
        if inner.failing.contains(path) {
            return Err(anyhow!("permission denied: {}", path.display()));
        }
        inner.registered.push(path.to_path_buf());
        Ok(())
    }

    fn is_watching(&self, path: &Path) -> bool {
        self.lock().registered.iter().any(|p| p == path)
    }

    fn watched_count(&self) -> usize {
        let inner = self.lock();
        inner.registered.iter().collect::<HashSet<_>>().len()
    }
}

fn forward_notify_result(res: notify::Result<Event>, senders: &WatchSenders) {
    match res {
        Ok(event) => {
            if event.need_rescan() {
                let _ = senders.errors.send(WatchError::overflow(event.paths));
                return;
            }
            for ev in translate_event(event, |p| p.exists()) {
                debug!("watch event {:?} {}", ev.kind, ev.path.display());
                let _ = senders.events.send(ev);
            }
        }
        Err(e) => {
            let _ = senders.errors.send(WatchError::from(e));
        }
    }
}

/// Flatten a notify event into per-path events.
///
/// Renames map onto remove/create semantics: the source path becomes
/// `Rename`, the destination becomes `Create`. Backends that cannot tell the
/// two apart (`RenameMode::Any`) are resolved with `exists`.
pub fn translate_event(event: Event, exists: impl Fn(&Path) -> bool) -> Vec<WatchEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(_) => with_kind(paths, WatchEventKind::Create),
        EventKind::Remove(_) => with_kind(paths, WatchEventKind::Remove),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            with_kind(paths, WatchEventKind::Rename)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            with_kind(paths, WatchEventKind::Create)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = paths.into_iter();
            let mut out = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                out.push(WatchEvent::new(from, WatchEventKind::Rename));
            }
            if let Some(to) = paths.next() {
                out.push(WatchEvent::new(to, WatchEventKind::Create));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|p| {
                let kind = if exists(&p) {
                    WatchEventKind::Create
                } else {
                    WatchEventKind::Rename
                };
                WatchEvent::new(p, kind)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => with_kind(paths, WatchEventKind::Chmod),
        EventKind::Modify(_) => with_kind(paths, WatchEventKind::Write),
        _ => with_kind(paths, WatchEventKind::Other),
    }
}

fn with_kind(paths: Vec<PathBuf>, kind: WatchEventKind) -> Vec<WatchEvent> {
    paths
        .into_iter()
        .map(|p| WatchEvent::new(p, kind))
        .collect()
}
