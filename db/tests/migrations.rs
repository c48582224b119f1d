use db::Db;
use rusqlite::Connection;

#[test]
fn fresh_db_sets_user_version() {
    let db = Db::open_in_memory().unwrap();
    assert_eq!(db.schema_version().unwrap(), 1);
}

#[test]
fn unversioned_files_table_is_deduplicated_and_constrained() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");

    // Simulate an older DB: no user_version and no uniqueness on path.
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            PRAGMA user_version = 0;
            CREATE TABLE files (
                id   INTEGER PRIMARY KEY,
                path TEXT NOT NULL,
                name TEXT NOT NULL
            );
            INSERT INTO files VALUES (1, '/a.txt', 'a.txt');
            INSERT INTO files VALUES (2, '/a.txt', 'a.txt');
            INSERT INTO files VALUES (3, '/b.txt', 'b.txt');
            "#,
        )
        .unwrap();
    }

    let db = Db::open(&path).unwrap();
    assert_eq!(db.schema_version().unwrap(), 1);
    assert_eq!(db.file_count().unwrap(), 2);
    assert_eq!(db.get_file("/a.txt").unwrap().unwrap().id, 1);
    assert!(db.insert_if_absent("/a.txt", "a.txt").unwrap().is_none());
    assert_eq!(db.insert_if_absent("/c.txt", "c.txt").unwrap(), Some(4));
}

#[test]
fn newer_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("PRAGMA user_version = 99;").unwrap();
    }
    assert!(Db::open(&path).is_err());
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    {
        let db = Db::open(&path).unwrap();
        db.insert_if_absent("/persist.txt", "persist.txt").unwrap();
    }
    let db = Db::open(&path).unwrap();
    assert!(db.exists_by_path("/persist.txt").unwrap());
}
