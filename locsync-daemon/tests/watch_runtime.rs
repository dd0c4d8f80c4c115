//! End-to-end watch mode: real filesystem events, real control socket.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use locsync_core::{DocumentStore, SyncConfig};
use locsync_daemon::{request_reconcile, request_status, request_stop, run_with, DaemonError};
use locsync_sync::Dispatcher;
use locsync_translate::MockTranslator;
use tempfile::TempDir;

fn config_for(dir: &Path) -> SyncConfig {
    SyncConfig {
        content_root: dir.join("blog"),
        state_dir: dir.join("state"),
        debounce_ms: 100,
        ..SyncConfig::default()
    }
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_source_is_translated_and_stop_ends_the_runtime() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(tmp.path());
    fs::create_dir_all(config.content_root.join("ru")).unwrap();

    let mock = MockTranslator::echo();
    let store = DocumentStore::new(config.content_root().unwrap());
    let root = store.root().path().to_path_buf();
    let dispatcher = Dispatcher::new(store, Arc::new(mock.clone()));

    let runtime_config = config.clone();
    let handle = tokio::spawn(async move { run_with(&runtime_config, dispatcher).await });

    let socket = config.state_dir.join("daemon.sock");
    wait_until("control socket", || socket.exists()).await;
    // Let the watcher register before the first write.
    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::write(root.join("ru/hello.md"), "---\ntitle: Привет\n---\nТекст\n").unwrap();

    let en = root.join("en/hello.md");
    let uz = root.join("uz/hello.md");
    wait_until("mirrors", || en.exists() && uz.exists()).await;
    let text = fs::read_to_string(&en).unwrap();
    assert!(text.contains("translated: true"), "{text}");

    // Writing the mirrors must not trigger further translations.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(mock.call_count(), 2);

    // A permission change leaves the mtime alone and is not an edit.
    fs::set_permissions(root.join("ru/hello.md"), fs::Permissions::from_mode(0o600)).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(mock.call_count(), 2);

    let state_dir = config.state_dir.clone();
    let status = tokio::task::spawn_blocking(move || request_status(&state_dir))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status["running"], serde_json::json!(true));
    assert_eq!(status["stats"]["targets_written"], serde_json::json!(2));

    let state_dir = config.state_dir.clone();
    let totals = tokio::task::spawn_blocking(move || request_reconcile(&state_dir))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(totals["written"], serde_json::json!(0));
    assert_eq!(totals["exit_code"], serde_json::json!(0));
    assert_eq!(mock.call_count(), 2);

    let state_dir = config.state_dir.clone();
    tokio::task::spawn_blocking(move || request_stop(&state_dir))
        .await
        .unwrap()
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("runtime did not stop")
        .unwrap()
        .unwrap();
    assert!(!socket.exists());
}

#[test]
fn status_without_runtime_reports_not_running() {
    let tmp = TempDir::new().unwrap();
    let err = tokio_test::assert_err!(request_status(tmp.path()));
    assert!(matches!(err, DaemonError::DaemonNotRunning { .. }));
}
