use std::fs;
use std::time::Duration;

use models::AppConfig;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use treeindex::config::validate_app_config;
use treeindex::{Engine, FileIndex, NotifyWatcher};

const DEADLINE: Duration = Duration::from_secs(10);

/// Poll the index until `done` accepts its paths or the deadline passes.
async fn settle(index: &FileIndex, done: impl Fn(&[String]) -> bool) -> Vec<String> {
    let start = Instant::now();
    loop {
        let paths: Vec<String> = index
            .list_under("/")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        if done(&paths) || start.elapsed() > DEADLINE {
            return paths;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn real_watcher_keeps_the_index_in_sync() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::write(root.join("x.txt"), b"x").unwrap();
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("sub").join("y.txt"), b"y").unwrap();

    let engine = Engine::new(AppConfig::new(&root)).unwrap();
    let (watcher, streams) = NotifyWatcher::new().unwrap();
    let handle = engine
        .start(Box::new(watcher), streams, CancellationToken::new())
        .await
        .unwrap();
    let index = handle.index().clone();

    assert_eq!(
        settle(&index, |_| true).await,
        vec!["/sub/y.txt", "/x.txt"]
    );

    // A new subtree is adopted as a whole.
    fs::create_dir_all(root.join("newdir").join("inner")).unwrap();
    fs::write(root.join("newdir").join("inner").join("f1.txt"), b"1").unwrap();
    fs::write(root.join("newdir").join("inner").join("f2.txt"), b"2").unwrap();
    let paths = settle(&index, |p| {
        p.iter().any(|s| s == "/newdir/inner/f1.txt") && p.iter().any(|s| s == "/newdir/inner/f2.txt")
    })
    .await;
    assert!(paths.contains(&"/newdir/inner/f1.txt".to_string()));
    assert!(paths.contains(&"/newdir/inner/f2.txt".to_string()));

    // Deleting a directory wholesale leaves nothing behind.
    fs::create_dir_all(root.join("tmp2")).unwrap();
    fs::write(root.join("tmp2").join("a.txt"), b"a").unwrap();
    settle(&index, |p| p.iter().any(|s| s == "/tmp2/a.txt")).await;
    fs::remove_dir_all(root.join("tmp2")).unwrap();
    let paths = settle(&index, |p| !p.iter().any(|s| s.starts_with("/tmp2/"))).await;
    assert!(!paths.iter().any(|s| s.starts_with("/tmp2/")));

    // Rename is delete plus create.
    fs::rename(root.join("x.txt"), root.join("renamed.txt")).unwrap();
    let paths = settle(&index, |p| {
        p.iter().any(|s| s == "/renamed.txt") && !p.iter().any(|s| s == "/x.txt")
    })
    .await;
    assert!(paths.contains(&"/renamed.txt".to_string()));
    assert!(!paths.contains(&"/x.txt".to_string()));

    // The state directory never shows up.
    assert!(!paths.iter().any(|s| s.starts_with("/.treeindex")));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn database_kept_inside_the_root_is_never_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::write(root.join("x.txt"), b"x").unwrap();
    let mut cfg = AppConfig::new(&root);
    cfg.db_path = Some(root.join("index.db"));
    validate_app_config(&mut cfg).unwrap();

    let engine = Engine::new(cfg).unwrap();
    let (watcher, streams) = NotifyWatcher::new().unwrap();
    let handle = engine
        .start(Box::new(watcher), streams, CancellationToken::new())
        .await
        .unwrap();
    let index = handle.index().clone();

    // Every insert touches the database and its journal.
    fs::write(root.join("y.txt"), b"y").unwrap();
    fs::write(root.join("z.txt"), b"z").unwrap();
    let paths = settle(&index, |p| p.len() >= 3).await;
    handle.request_rescan().await.unwrap();
    let after_rescan = settle(&index, |_| true).await;

    assert_eq!(paths, vec!["/x.txt", "/y.txt", "/z.txt"]);
    assert_eq!(after_rescan, paths);

    handle.shutdown().await.unwrap();
}
