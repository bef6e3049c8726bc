//! File watcher tests against the real notify backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use docmd::{ChangeHandler, ChangeWatcher, WatchError};
use futures::FutureExt;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Handler that forwards every fired path to a channel.
fn forwarding_handler() -> (ChangeHandler, mpsc::UnboundedReceiver<PathBuf>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: ChangeHandler = Arc::new(move |path: PathBuf| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(path);
            Ok(())
        }
        .boxed()
    });
    (handler, rx)
}

#[tokio::test]
async fn test_write_to_watched_file_fires_once() {
    let dir = TempDir::new().unwrap();
    let watched = dir.path().join("notes.md");
    let other = dir.path().join("other.md");
    std::fs::write(&watched, "v1").unwrap();
    std::fs::write(&other, "x").unwrap();

    let (handler, mut fired) = forwarding_handler();
    let session = ChangeWatcher::new([&watched], Duration::from_millis(200))
        .unwrap()
        .start(handler)
        .unwrap();
    let running = tokio::spawn(session.run());

    // Give the backend a moment to settle before editing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&other, "y").unwrap();
    for i in 0..3 {
        std::fs::write(&watched, format!("v{}", i + 2)).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    let first = timeout(Duration::from_secs(10), fired.recv())
        .await
        .expect("watch callback never fired")
        .unwrap();
    assert_eq!(first, docmd_core::canonical_key(&watched).unwrap());

    // The burst settles into a single callback and the unwatched sibling never fires.
    assert!(
        timeout(Duration::from_millis(1500), fired.recv()).await.is_err(),
        "unexpected extra callback"
    );

    running.abort();
}

#[tokio::test]
async fn test_atomic_replace_is_observed() {
    let dir = TempDir::new().unwrap();
    let watched = dir.path().join("notes.md");
    std::fs::write(&watched, "v1").unwrap();

    let (handler, mut fired) = forwarding_handler();
    let session = ChangeWatcher::new([&watched], Duration::from_millis(100))
        .unwrap()
        .start(handler)
        .unwrap();
    let running = tokio::spawn(session.run());

    tokio::time::sleep(Duration::from_millis(100)).await;
    // Editors that save via temp file + rename
    let temp = dir.path().join(".notes.md.tmp");
    std::fs::write(&temp, "v2").unwrap();
    std::fs::rename(&temp, &watched).unwrap();

    let path = timeout(Duration::from_secs(10), fired.recv())
        .await
        .expect("watch callback never fired")
        .unwrap();
    assert!(path.ends_with("notes.md"));

    running.abort();
}

#[tokio::test]
async fn test_watch_with_no_paths_is_rejected() {
    let (handler, _fired) = forwarding_handler();
    let result = docmd::watch(Vec::<PathBuf>::new(), Duration::from_millis(100), handler).await;
    assert!(matches!(result, Err(WatchError::NoPaths)));
}

#[tokio::test]
async fn test_missing_directory_fails_to_start() {
    let dir = TempDir::new().unwrap();
    let (handler, _fired) = forwarding_handler();
    let result = ChangeWatcher::new(
        [dir.path().join("no-such-dir").join("notes.md")],
        Duration::from_millis(100),
    )
    .unwrap()
    .start(handler);
    assert!(matches!(result, Err(WatchError::Subscribe { .. })));
}
