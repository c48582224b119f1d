use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Symlinks are reported as neither file nor directory and are never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsMetadata {
    pub is_file: bool,
    pub is_dir: bool,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: PathBuf,
    pub metadata: FsMetadata,
}

pub trait FileSystem: Send + Sync {
    fn metadata(&self, path: &Path) -> io::Result<FsMetadata>;
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

fn to_fs_metadata(md: &std::fs::Metadata) -> FsMetadata {
    FsMetadata {
        is_file: md.is_file(),
        is_dir: md.is_dir(),
    }
}

impl FileSystem for RealFileSystem {
    fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let md = std::fs::symlink_metadata(path)?;
        Ok(to_fs_metadata(&md))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let entries = std::fs::read_dir(path)?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let md = match entry.metadata() {
                Ok(md) => md,
                // Removed between listing and inspection.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            out.push(DirEntry {
                path,
                metadata: to_fs_metadata(&md),
            });
        }
        Ok(out)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, data)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

/// In-memory filesystem for tests. Paths are absolute and `/`-rooted.
#[derive(Debug, Clone)]
pub struct VirtualFileSystem {
    inner: Arc<Mutex<VirtualFsInner>>,
}

#[derive(Debug, Default)]
struct VirtualFsInner {
    nodes: HashMap<PathBuf, VNode>,
    children: HashMap<PathBuf, BTreeMap<String, PathBuf>>,
    unreadable: HashSet<PathBuf>,
}

#[derive(Debug, Clone)]
enum VNode {
    // Contents are not kept; only the shape of the tree matters.
    File,
    Dir,
}

impl VNode {
    fn metadata(&self) -> FsMetadata {
        match self {
            VNode::File => FsMetadata {
                is_file: true,
                is_dir: false,
            },
            VNode::Dir => FsMetadata {
                is_file: false,
                is_dir: true,
            },
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

impl Default for VirtualFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        let mut inner = VirtualFsInner::default();
        inner.nodes.insert(PathBuf::from("/"), VNode::Dir);
        VirtualFileSystem {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Make `read_dir` on `path` fail with `PermissionDenied`.
    pub fn set_unreadable(&self, path: &Path) {
        self.lock().unreadable.insert(Self::normalize(path));
    }

    fn lock(&self) -> MutexGuard<'_, VirtualFsInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn normalize(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for comp in path.components() {
            match comp {
                Component::RootDir => {
                    components.clear();
                    components.push(PathBuf::from("/"));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    components.pop();
                }
                Component::Normal(c) => {
                    let mut p = components.last().cloned().unwrap_or_else(|| PathBuf::from("/"));
                    p.push(c);
                    components.push(p);
                }
                Component::Prefix(_) => {}
            }
        }
        components.last().cloned().unwrap_or_else(|| PathBuf::from("/"))
    }

    fn link_child(inner: &mut VirtualFsInner, path: &Path) {
        if let Some(parent) = path.parent() {
            let name = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            inner
                .children
                .entry(parent.to_path_buf())
                .or_default()
                .insert(name, path.to_path_buf());
        }
    }

    fn unlink_child(inner: &mut VirtualFsInner, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Some(children) = inner.children.get_mut(parent) {
                children.retain(|_, p| p != path);
            }
        }
    }

    fn ensure_dirs(inner: &mut VirtualFsInner, path: &Path) {
        let mut current = PathBuf::from("/");
        for comp in path.components() {
            if let Component::Normal(c) = comp {
                current.push(c);
                if !inner.nodes.contains_key(&current) {
                    inner.nodes.insert(current.clone(), VNode::Dir);
                    Self::link_child(inner, &current);
                }
            }
        }
    }

    /// `path` and every node beneath it.
    fn subtree(inner: &VirtualFsInner, path: &Path) -> Vec<PathBuf> {
        inner
            .nodes
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect()
    }
}

impl FileSystem for VirtualFileSystem {
    fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let inner = self.lock();
        let norm = Self::normalize(path);
        inner
            .nodes
            .get(&norm)
            .map(VNode::metadata)
            .ok_or_else(|| not_found(&norm))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let inner = self.lock();
        let norm = Self::normalize(path);
        match inner.nodes.get(&norm) {
            Some(VNode::Dir) => {}
            Some(VNode::File) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is not a directory", norm.display()),
                ))
            }
            None => return Err(not_found(&norm)),
        }
        if inner.unreadable.contains(&norm) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is not readable", norm.display()),
            ));
        }
        let mut out = Vec::new();
        if let Some(children) = inner.children.get(&norm) {
            for child_path in children.values() {
                if let Some(node) = inner.nodes.get(child_path) {
                    out.push(DirEntry {
                        path: child_path.clone(),
                        metadata: node.metadata(),
                    });
                }
            }
        }
        Ok(out)
    }

    fn write(&self, path: &Path, _data: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        let norm = Self::normalize(path);
        if let Some(parent) = norm.parent() {
            Self::ensure_dirs(&mut inner, parent);
        }
        if let Some(VNode::Dir) = inner.nodes.get(&norm) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is a directory", norm.display()),
            ));
        }
        inner.nodes.insert(norm.clone(), VNode::File);
        Self::link_child(&mut inner, &norm);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        let norm = Self::normalize(path);
        Self::ensure_dirs(&mut inner, &norm);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        let from_norm = Self::normalize(from);
        let to_norm = Self::normalize(to);

        if from_norm == to_norm {
            return Ok(());
        }
        if !inner.nodes.contains_key(&from_norm) {
            return Err(not_found(&from_norm));
        }
        if let Some(parent) = to_norm.parent() {
            Self::ensure_dirs(&mut inner, parent);
        }

        Self::unlink_child(&mut inner, &from_norm);
        for old in Self::subtree(&inner, &from_norm) {
            let Ok(rest) = old.strip_prefix(&from_norm) else {
                continue;
            };
            let new = if rest.as_os_str().is_empty() {
                to_norm.clone()
            } else {
                to_norm.join(rest)
            };
            if let Some(node) = inner.nodes.remove(&old) {
                inner.nodes.insert(new.clone(), node);
            }
            if let Some(children) = inner.children.remove(&old) {
                let moved = children
                    .into_iter()
                    .map(|(name, _)| {
                        let child = new.join(&name);
                        (name, child)
                    })
                    .collect();
                inner.children.insert(new, moved);
            }
        }
        Self::link_child(&mut inner, &to_norm);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        let norm = Self::normalize(path);
        match inner.nodes.get(&norm) {
            Some(VNode::File) => {}
            Some(VNode::Dir) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is a directory", norm.display()),
                ))
            }
            None => return Err(not_found(&norm)),
        }
        inner.nodes.remove(&norm);
        Self::unlink_child(&mut inner, &norm);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        let norm = Self::normalize(path);
        match inner.nodes.get(&norm) {
            Some(VNode::Dir) => {}
            Some(VNode::File) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is not a directory", norm.display()),
                ))
            }
            None => return Err(not_found(&norm)),
        }
        for p in Self::subtree(&inner, &norm) {
            inner.nodes.remove(&p);
            inner.children.remove(&p);
            inner.unreadable.remove(&p);
        }
        Self::unlink_child(&mut inner, &norm);
        Ok(())
    }
}
