//! Ignore patterns over logical paths (`/sub/file.txt`).
//!
//! Patterns and paths are compared segment by segment. A pattern without a
//! separator (`*.tmp`, `.treeindex`) matches a single segment at any depth.
//! A pattern with a separator (`/index.db`, `build/*.o`) is anchored at the
//! root, and a `**` segment in it spans any number of segments. A pattern
//! that matches a directory also covers everything beneath it.

type Segment = Vec<char>;

fn segments(path: &str) -> Vec<Segment> {
    path.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| {
            if cfg!(windows) {
                s.to_ascii_lowercase().chars().collect()
            } else {
                s.chars().collect()
            }
        })
        .collect()
}

/// `*` and `?` never cross a segment boundary.
fn segment_matches(pattern: &[char], name: &[char]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some(('*', rest)) => (0..=name.len()).any(|skip| segment_matches(rest, &name[skip..])),
        Some(('?', rest)) => !name.is_empty() && segment_matches(rest, &name[1..]),
        Some((c, rest)) => name.first() == Some(c) && segment_matches(rest, &name[1..]),
    }
}

fn is_globstar(segment: &[char]) -> bool {
    segment == ['*', '*']
}

fn anchored_matches(pattern: &[Segment], path: &[Segment]) -> bool {
    match pattern.split_first() {
        // Whatever is left of the path lies beneath the match.
        None => true,
        Some((seg, rest)) if is_globstar(seg) => {
            (0..=path.len()).any(|skip| anchored_matches(rest, &path[skip..]))
        }
        Some((seg, rest)) => match path.split_first() {
            Some((name, tail)) => segment_matches(seg, name) && anchored_matches(rest, tail),
            None => false,
        },
    }
}

fn pattern_matches(pattern: &str, path: &[Segment]) -> bool {
    let anchored = pattern.contains(['/', '\\']);
    let pattern = segments(pattern);
    match pattern.as_slice() {
        [] => false,
        [seg] if !anchored => path.iter().any(|name| segment_matches(seg, name)),
        _ => anchored_matches(&pattern, path),
    }
}

/// The root itself is never ignored.
pub fn is_ignored_logical_path(logical_path: &str, ignore_patterns: &[String]) -> bool {
    let path = segments(logical_path);
    if path.is_empty() {
        return false;
    }
    ignore_patterns.iter().any(|p| pattern_matches(p, &path))
}

#[cfg(test)]
mod tests {
    use super::is_ignored_logical_path;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn bare_names_match_at_any_depth() {
        let p = patterns(&["*.tmp", "Thumbs.db"]);
        assert!(is_ignored_logical_path("/a/b/c.tmp", &p));
        assert!(is_ignored_logical_path("/Thumbs.db", &p));
        assert!(is_ignored_logical_path("/pics/Thumbs.db", &p));
        assert!(!is_ignored_logical_path("/a/b/c.txt", &p));
        assert!(!is_ignored_logical_path("/a.tmp.txt", &p));
    }

    #[test]
    fn wildcards_stay_inside_one_segment() {
        let p = patterns(&["docs/*.bak", "?.o"]);
        assert!(is_ignored_logical_path("/docs/old.bak", &p));
        assert!(!is_ignored_logical_path("/docs/deep/old.bak", &p));
        assert!(is_ignored_logical_path("/src/a.o", &p));
        assert!(!is_ignored_logical_path("/src/ab.o", &p));
    }

    #[test]
    fn anchored_patterns_cover_the_subtree() {
        let p = patterns(&["/index.db", "build/out"]);
        assert!(is_ignored_logical_path("/index.db", &p));
        assert!(!is_ignored_logical_path("/sub/index.db", &p));
        assert!(!is_ignored_logical_path("/index.db-wal", &p));
        assert!(is_ignored_logical_path("/build/out", &p));
        assert!(is_ignored_logical_path("/build/out/x/y.bin", &p));
        assert!(!is_ignored_logical_path("/build/outside", &p));
    }

    #[test]
    fn globstar_spans_directories() {
        let p = patterns(&["**/cache/*.bin"]);
        assert!(is_ignored_logical_path("/cache/a.bin", &p));
        assert!(is_ignored_logical_path("/x/y/cache/a.bin", &p));
        assert!(!is_ignored_logical_path("/x/cache/sub/a.txt", &p));
    }

    #[test]
    fn state_directory_defaults() {
        let p = patterns(&[".treeindex", ".treeindex/*"]);
        assert!(is_ignored_logical_path("/.treeindex", &p));
        assert!(is_ignored_logical_path("/.treeindex/index.db-journal", &p));
        assert!(!is_ignored_logical_path("/docs/.treeindex.txt", &p));
        assert!(!is_ignored_logical_path("/", &p));
    }

    #[test]
    fn empty_patterns_ignore_nothing() {
        assert!(!is_ignored_logical_path("/anything", &[]));
        assert!(!is_ignored_logical_path("/anything", &patterns(&["", "/"])));
    }
}
