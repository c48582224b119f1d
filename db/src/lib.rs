#![allow(dead_code)]

use models::IndexedFile;
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const DB_SCHEMA_VERSION: i32 = 1;

/// The only table identities are handed out for.
pub const FILES_TABLE: &str = "files";

pub struct Db {
    conn: Connection,
}

pub trait DbFactory: Send + Sync {
    fn create(&self) -> Result<Db>;
}

pub struct DiskDbFactory {
    pub path: PathBuf,
}

impl DbFactory for DiskDbFactory {
    fn create(&self) -> Result<Db> {
        Db::open(&self.path)
    }
}

pub struct MemoryDbFactory;

impl DbFactory for MemoryDbFactory {
    fn create(&self) -> Result<Db> {
        Db::open_in_memory()
    }
}

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Db { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Db { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id     INTEGER PRIMARY KEY,
                path   TEXT NOT NULL,
                name   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS identities (
                table_name TEXT PRIMARY KEY,
                last_id    INTEGER NOT NULL
            );
            "#,
        )?;
        self.apply_schema_migrations()?;
        Ok(())
    }

    fn apply_schema_migrations(&self) -> Result<()> {
        let current: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if current > DB_SCHEMA_VERSION {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISMATCH),
                Some(format!(
                    "db schema version {} is newer than this binary supports (max {})",
                    current, DB_SCHEMA_VERSION
                )),
            ));
        }

        if current < 1 {
            // Unversioned databases may hold duplicate paths; keep the oldest row.
            self.conn.execute_batch(
                r#"
                DELETE FROM files
                WHERE id NOT IN (SELECT MIN(id) FROM files GROUP BY path);
                CREATE UNIQUE INDEX IF NOT EXISTS files_path_unique ON files(path);
                "#,
            )?;
        }

        self.conn
            .execute_batch(&format!("PRAGMA user_version = {DB_SCHEMA_VERSION};"))?;

        Ok(())
    }

    pub fn schema_version(&self) -> Result<i32> {
        self.conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
    }

    /* Identities */

    /// Next unused identity for `table`. Identities are never handed out twice,
    /// including ones whose rows were deleted.
    pub fn next_identity(&self, table: &str) -> Result<i64> {
        if table != FILES_TABLE {
            return Err(rusqlite::Error::InvalidParameterName(table.to_string()));
        }
        self.conn.query_row(
            r#"
            SELECT MAX(
                COALESCE((SELECT last_id FROM identities WHERE table_name = ?1), 0),
                COALESCE((SELECT MAX(id) FROM files), 0)
            ) + 1
            "#,
            params![table],
            |row| row.get(0),
        )
    }

    /* Files */

    /// Insert a record with a caller-supplied identity. Returns `false` when a
    /// record already holds `path`; the existing row is left untouched.
    pub fn insert_file(&self, id: i64, path: &str, name: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute(
            r#"
            INSERT INTO files (id, path, name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(path) DO NOTHING
            "#,
            params![id, path, name],
        )?;
        if rows > 0 {
            tx.execute(
                r#"
                INSERT INTO identities (table_name, last_id)
                VALUES (?1, ?2)
                ON CONFLICT(table_name) DO UPDATE SET
                    last_id = MAX(last_id, excluded.last_id)
                "#,
                params![FILES_TABLE, id],
            )?;
        }
        tx.commit()?;
        Ok(rows > 0)
    }

    /// Idempotent insert: returns the new identity, or `None` when `path` was
    /// already indexed.
    pub fn insert_if_absent(&self, path: &str, name: &str) -> Result<Option<i64>> {
        if self.exists_by_path(path)? {
            return Ok(None);
        }
        let id = self.next_identity(FILES_TABLE)?;
        if self.insert_file(id, path, name)? {
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }

    pub fn exists_by_path(&self, path: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM files WHERE path = ?1 LIMIT 1")?;
        stmt.exists(params![path])
    }

    pub fn get_file(&self, path: &str) -> Result<Option<IndexedFile>> {
        self.conn
            .query_row(
                "SELECT id, path, name FROM files WHERE path = ?1",
                params![path],
                row_to_file,
            )
            .optional()
    }

    pub fn delete_by_path(&self, path: &str) -> Result<usize> {
        self.conn
            .execute("DELETE FROM files WHERE path = ?1", params![path])
    }

    /// Delete every record strictly beneath the directory `prefix`.
    pub fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        let dir = directory_prefix(prefix);
        self.conn.execute(
            "DELETE FROM files WHERE substr(path, 1, length(?1)) = ?1",
            params![dir],
        )
    }

    /// Records strictly beneath the directory `prefix`, ordered by path.
    pub fn list_under(&self, prefix: &str) -> Result<Vec<IndexedFile>> {
        let dir = directory_prefix(prefix);
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, path, name
            FROM files
            WHERE substr(path, 1, length(?1)) = ?1
            ORDER BY path ASC
            "#,
        )?;
        let rows = stmt.query_map(params![dir], row_to_file)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn list_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM files ORDER BY path ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn file_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
    }

    /// Delete every record whose path is not in `seen`, returning the removed
    /// paths. Records at or beneath any `protected` path are kept.
    /// Runs in one transaction.
    pub fn delete_unseen(
        &self,
        seen: &HashSet<String>,
        protected: &[String],
    ) -> Result<Vec<String>> {
        let is_protected = |path: &str| {
            protected
                .iter()
                .any(|p| path == p.as_str() || path.starts_with(directory_prefix(p).as_str()))
        };
        let stale: Vec<String> = self
            .list_paths()?
            .into_iter()
            .filter(|p| !seen.contains(p) && !is_protected(p.as_str()))
            .collect();
        if stale.is_empty() {
            return Ok(stale);
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM files WHERE path = ?1")?;
            for path in &stale {
                stmt.execute(params![path])?;
            }
        }
        tx.commit()?;
        Ok(stale)
    }
}

fn row_to_file(row: &rusqlite::Row<'_>) -> Result<IndexedFile> {
    Ok(IndexedFile {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
    })
}

/// `/a/b` -> `/a/b/` so a prefix match never reaches a sibling like `/a/bc`.
pub fn directory_prefix(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}
