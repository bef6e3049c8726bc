//! Link, push, edit and force-push one file through the whole engine.

use std::fs;
use std::sync::Arc;

use chrono::{Duration, Utc};
use docmd_core::{
    Fingerprint, InMemoryRemote, LinkOptions, LinkOutcome, LinkStore, PlainRenderer, PushOptions,
    PushOutcome, ScriptedPrompt, StaticAuth, SyncEngine, has_remote_conflict,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_link_push_edit_force_push() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LinkStore::open(dir.path().join(".docmd").join("config.json")).unwrap());
    let remote = Arc::new(InMemoryRemote::new());
    let prompt = Arc::new(ScriptedPrompt::new(Vec::<String>::new()));
    let engine = SyncEngine::new(
        Arc::clone(&store),
        remote.clone(),
        Arc::new(PlainRenderer),
        Arc::new(StaticAuth(true)),
        prompt.clone(),
    );

    let notes = dir.path().join("notes.md");
    fs::write(&notes, "# Notes\n").unwrap();

    // Link: one entry keyed by the absolute path, no fingerprint yet.
    let LinkOutcome::Created { key, link } =
        engine.link(&notes, LinkOptions::default()).await.unwrap()
    else {
        panic!("expected a new link");
    };
    assert_eq!(key, notes);
    assert!(key.is_absolute());
    assert_eq!(store.snapshot().len(), 1);
    assert!(link.local_fingerprint_at_sync.is_none());
    assert_eq!(link.last_sync, Some(link.created_at));

    // Push without edits on either side: no conflict, fingerprint recorded.
    let remote_modified = remote.document(&link.document_id).unwrap().modified_time;
    assert!(!has_remote_conflict(&link, remote_modified));
    let PushOutcome::Pushed { link: pushed, warnings, .. } =
        engine.push(&notes, PushOptions::default()).await.unwrap()
    else {
        panic!("expected a push");
    };
    assert!(warnings.is_empty());
    assert!(pushed.last_sync > link.last_sync);
    assert_eq!(
        pushed.local_fingerprint_at_sync,
        Some(Fingerprint::of(b"# Notes\n"))
    );
    assert!(!store.has_local_changes(&notes).unwrap());

    // Edit locally, someone edits remotely, then force push.
    fs::write(&notes, "# Notes\n\nmore\n").unwrap();
    assert!(store.has_local_changes(&notes).unwrap());
    remote.edit_out_of_band(
        &link.document_id,
        "theirs",
        Utc::now() + Duration::minutes(1),
        "bo@example.com",
    );
    let info_calls = remote.info_calls();

    let force = PushOptions {
        force: true,
        ..PushOptions::default()
    };
    let PushOutcome::Pushed { link: forced, .. } = engine.push(&notes, force).await.unwrap() else {
        panic!("expected a push");
    };
    assert_eq!(remote.info_calls(), info_calls);
    assert!(prompt.asked().is_empty());
    assert_eq!(
        remote.document(&link.document_id).unwrap().content,
        "# Notes\n\nmore\n"
    );
    assert_eq!(
        forced.local_fingerprint_at_sync,
        Some(Fingerprint::of(b"# Notes\n\nmore\n"))
    );
    assert!(forced.last_sync >= pushed.last_sync);

    // The table on disk matches memory.
    assert_eq!(LinkStore::load(store.path()).unwrap(), store.snapshot());
}
