use std::sync::Arc;

use anyhow::{Context, Result};
use db::Db;
use models::IndexedFile;
use tokio::sync::Mutex;

/// Read-only view of the index for callers outside the reconciler.
#[derive(Clone)]
pub struct FileIndex {
    db: Arc<Mutex<Db>>,
}

impl FileIndex {
    pub fn new(db: Arc<Mutex<Db>>) -> Self {
        Self { db }
    }

    pub async fn get(&self, path: &str) -> Result<Option<IndexedFile>> {
        self.db
            .lock()
            .await
            .get_file(path)
            .with_context(|| format!("failed to look up {path}"))
    }

    pub async fn contains(&self, path: &str) -> Result<bool> {
        self.db
            .lock()
            .await
            .exists_by_path(path)
            .with_context(|| format!("failed to look up {path}"))
    }

    /// Files strictly beneath `dir`; `"/"` lists the whole index.
    pub async fn list_under(&self, dir: &str) -> Result<Vec<IndexedFile>> {
        self.db
            .lock()
            .await
            .list_under(dir)
            .with_context(|| format!("failed to list {dir}"))
    }

    pub async fn count(&self) -> Result<i64> {
        self.db
            .lock()
            .await
            .file_count()
            .context("failed to count indexed files")
    }
}

#[cfg(test)]
mod tests {
    use super::FileIndex;
    use db::Db;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    async fn seeded() -> FileIndex {
        let db = Db::open_in_memory().unwrap();
        for p in ["/docs/a.txt", "/docs/deep/b.txt", "/docsets/c.txt", "/top.txt"] {
            db.insert_if_absent(p, p.rsplit('/').next().unwrap()).unwrap();
        }
        FileIndex::new(Arc::new(Mutex::new(db)))
    }

    #[tokio::test]
    async fn exact_lookups() {
        let index = seeded().await;
        let rec = index.get("/docs/a.txt").await.unwrap().unwrap();
        assert_eq!(rec.name, "a.txt");
        assert!(index.contains("/top.txt").await.unwrap());
        assert!(!index.contains("/docs").await.unwrap());
        assert!(index.get("/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_is_bounded_by_the_separator() {
        let index = seeded().await;
        let under: Vec<String> = index
            .list_under("/docs")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(under, vec!["/docs/a.txt", "/docs/deep/b.txt"]);
        assert_eq!(index.list_under("/").await.unwrap().len(), 4);
        assert_eq!(index.count().await.unwrap(), 4);
    }
}
