use std::collections::HashSet;

use db::{Db, FILES_TABLE};

fn paths(db: &Db) -> Vec<String> {
    db.list_paths().unwrap()
}

#[test]
fn insert_if_absent_is_idempotent() {
    let db = Db::open_in_memory().unwrap();
    let first = db.insert_if_absent("/docs/a.txt", "a.txt").unwrap();
    let second = db.insert_if_absent("/docs/a.txt", "a.txt").unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(db.file_count().unwrap(), 1);
}

#[test]
fn insert_file_reports_path_conflict_instead_of_failing() {
    let db = Db::open_in_memory().unwrap();
    assert!(db.insert_file(10, "/x.txt", "x.txt").unwrap());
    assert!(!db.insert_file(11, "/x.txt", "x.txt").unwrap());

    let rec = db.get_file("/x.txt").unwrap().unwrap();
    assert_eq!(rec.id, 10);
    assert_eq!(rec.name, "x.txt");
}

#[test]
fn identities_are_not_reused_after_delete() {
    let db = Db::open_in_memory().unwrap();
    let a = db.insert_if_absent("/a", "a").unwrap().unwrap();
    let b = db.insert_if_absent("/b", "b").unwrap().unwrap();
    assert!(b > a);

    db.delete_by_path("/b").unwrap();
    let c = db.insert_if_absent("/c", "c").unwrap().unwrap();
    assert!(c > b);
    assert_eq!(db.next_identity(FILES_TABLE).unwrap(), c + 1);
}

#[test]
fn next_identity_rejects_unknown_tables() {
    let db = Db::open_in_memory().unwrap();
    assert!(db.next_identity("users").is_err());
}

#[test]
fn prefix_delete_respects_separator_boundary() {
    let db = Db::open_in_memory().unwrap();
    for p in ["/a/b/x", "/a/b/y", "/a/bc/z"] {
        db.insert_if_absent(p, p.rsplit('/').next().unwrap()).unwrap();
    }

    let removed = db.delete_by_prefix("/a/b").unwrap();
    assert_eq!(removed, 2);
    assert_eq!(paths(&db), vec!["/a/bc/z".to_string()]);
}

#[test]
fn prefix_delete_of_root_clears_everything() {
    let db = Db::open_in_memory().unwrap();
    db.insert_if_absent("/x.txt", "x.txt").unwrap();
    db.insert_if_absent("/sub/y.txt", "y.txt").unwrap();

    assert_eq!(db.delete_by_prefix("/").unwrap(), 2);
    assert_eq!(db.file_count().unwrap(), 0);
}

#[test]
fn exact_delete_leaves_descendants_of_similar_paths() {
    let db = Db::open_in_memory().unwrap();
    db.insert_if_absent("/a/b", "b").unwrap();
    db.insert_if_absent("/a/b.txt", "b.txt").unwrap();

    assert_eq!(db.delete_by_path("/a/b").unwrap(), 1);
    assert!(!db.exists_by_path("/a/b").unwrap());
    assert!(db.exists_by_path("/a/b.txt").unwrap());
}

#[test]
fn list_under_returns_sorted_strict_descendants() {
    let db = Db::open_in_memory().unwrap();
    for p in ["/music/z.mp3", "/music/a/b.mp3", "/musicals/c.mp3", "/music"] {
        db.insert_if_absent(p, p.rsplit('/').next().unwrap()).unwrap();
    }

    let listed: Vec<String> = db
        .list_under("/music")
        .unwrap()
        .into_iter()
        .map(|f| f.path)
        .collect();
    assert_eq!(listed, vec!["/music/a/b.mp3", "/music/z.mp3"]);
}

#[test]
fn delete_unseen_prunes_only_missing_paths() {
    let db = Db::open_in_memory().unwrap();
    for p in ["/keep.txt", "/gone.txt", "/sub/keep.txt", "/sub/gone.txt"] {
        db.insert_if_absent(p, p.rsplit('/').next().unwrap()).unwrap();
    }
    let seen: HashSet<String> = ["/keep.txt", "/sub/keep.txt", "/never-indexed.txt"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut removed = db.delete_unseen(&seen, &[]).unwrap();
    removed.sort();
    assert_eq!(removed, vec!["/gone.txt", "/sub/gone.txt"]);
    assert_eq!(paths(&db), vec!["/keep.txt", "/sub/keep.txt"]);
}

#[test]
fn delete_unseen_keeps_records_under_protected_directories() {
    let db = Db::open_in_memory().unwrap();
    for p in ["/locked/a.txt", "/lockedness.txt", "/open/b.txt"] {
        db.insert_if_absent(p, p.rsplit('/').next().unwrap()).unwrap();
    }

    let removed = db
        .delete_unseen(&HashSet::new(), &["/locked".to_string()])
        .unwrap();

    assert_eq!(removed.len(), 2);
    assert_eq!(paths(&db), vec!["/locked/a.txt"]);
}
