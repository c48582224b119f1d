use anyhow::{Context, Result};
use db::Db;
use models::{AppConfig, IndexedFile};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct IndexStatus {
    pub root: String,
    pub db_path: String,
    pub schema_version: i32,
    pub file_count: i64,
    /// Present only when a prefix was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<IndexedFile>,
    pub timestamp: i64,
}

pub fn collect_status(cfg: &AppConfig, prefix: Option<&str>) -> Result<IndexStatus> {
    let db_path = cfg.resolved_db_path();
    if !db_path.is_file() {
        anyhow::bail!(
            "no index at {}; run `treeindex scan` or `treeindex run` first",
            db_path.display()
        );
    }
    let db = Db::open(&db_path)
        .with_context(|| format!("failed to open DB {}", db_path.display()))?;
    status_from_db(cfg, &db, prefix)
}

fn status_from_db(cfg: &AppConfig, db: &Db, prefix: Option<&str>) -> Result<IndexStatus> {
    let files = match prefix {
        Some(p) => db.list_under(p)?,
        None => Vec::new(),
    };
    Ok(IndexStatus {
        root: cfg.root_path.display().to_string(),
        db_path: cfg.resolved_db_path().display().to_string(),
        schema_version: db.schema_version()?,
        file_count: db.file_count()?,
        prefix: prefix.map(str::to_string),
        files,
        timestamp: OffsetDateTime::now_utc().unix_timestamp(),
    })
}

pub fn print_status(status: &IndexStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }
    println!("Root: {}", status.root);
    println!("DB: {} (schema v{})", status.db_path, status.schema_version);
    println!("Files: {}", status.file_count);
    if let Some(prefix) = &status.prefix {
        println!();
        println!("Under {} ({}):", prefix, status.files.len());
        for f in &status.files {
            println!("  #{:<6} {}", f.id, f.path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::status_from_db;
    use db::Db;
    use models::AppConfig;

    #[test]
    fn status_lists_only_the_requested_prefix() {
        let cfg = AppConfig::new("/srv/data");
        let db = Db::open_in_memory().unwrap();
        db.insert_if_absent("/a/one.txt", "one.txt").unwrap();
        db.insert_if_absent("/b/two.txt", "two.txt").unwrap();

        let status = status_from_db(&cfg, &db, Some("/a")).unwrap();

        assert_eq!(status.file_count, 2);
        assert_eq!(status.schema_version, 1);
        assert_eq!(status.files.len(), 1);
        assert_eq!(status.files[0].path, "/a/one.txt");
        assert!(status.db_path.ends_with("index.db"));
    }

    #[test]
    fn json_omits_the_listing_without_a_prefix() {
        let cfg = AppConfig::new("/srv/data");
        let db = Db::open_in_memory().unwrap();

        let status = status_from_db(&cfg, &db, None).unwrap();
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["file_count"], 0);
        assert!(json.get("files").is_none());
        assert!(json.get("prefix").is_none());
    }
}
