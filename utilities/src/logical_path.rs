use std::path::{Component, Path};

/// Convert an absolute path under `root` into the index key for it: root
/// relative, `/`-separated and always starting with `/` (`/subdir/file.txt`).
/// The root itself maps to `/`.
///
/// Returns `None` for paths outside `root`, including ones that climb out of it
/// through `..`.
pub fn logical_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(c) => {
                out.push('/');
                out.push_str(&c.to_string_lossy());
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Some(out)
}

/// Last segment of `path`, as stored in the record's display name.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{display_name, logical_path};
    use std::path::{Path, PathBuf};

    #[test]
    fn strips_root_and_keeps_leading_separator() {
        let root = Path::new("/srv/files");
        assert_eq!(
            logical_path(root, Path::new("/srv/files/subdir/file.txt")).as_deref(),
            Some("/subdir/file.txt")
        );
        assert_eq!(
            logical_path(root, Path::new("/srv/files/x.txt")).as_deref(),
            Some("/x.txt")
        );
    }

    #[test]
    fn root_maps_to_single_separator() {
        let root = Path::new("/srv/files");
        assert_eq!(logical_path(root, root).as_deref(), Some("/"));
    }

    #[test]
    fn root_with_trailing_separator_is_equivalent() {
        let root = PathBuf::from("/srv/files/");
        assert_eq!(
            logical_path(&root, Path::new("/srv/files/a/b")).as_deref(),
            Some("/a/b")
        );
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_under_root() {
        let root = Path::new("/srv/files");
        assert_eq!(logical_path(root, Path::new("/srv/files2/a.txt")), None);
        assert_eq!(logical_path(root, Path::new("/etc/passwd")), None);
    }

    #[test]
    fn parent_components_are_rejected() {
        let root = Path::new("/srv/files");
        assert_eq!(logical_path(root, Path::new("/srv/files/../secret")), None);
    }

    #[cfg(windows)]
    #[test]
    fn converts_backslashes() {
        let root = Path::new(r"C:\data");
        assert_eq!(
            logical_path(root, Path::new(r"C:\data\sub\f.txt")).as_deref(),
            Some("/sub/f.txt")
        );
    }

    #[test]
    fn display_name_is_last_segment() {
        assert_eq!(display_name(Path::new("/a/b/report.pdf")), "report.pdf");
        assert_eq!(display_name(Path::new("/")), "");
    }
}
