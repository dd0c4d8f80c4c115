//! Watch-mode runtime: watcher + dispatch loop + control socket + ctrl-c.
//!
//! All tasks share one broadcast shutdown channel; whichever finishes first
//! (a `stop` request, ctrl-c, a fatal error) brings the others down.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};

use locsync_core::{DocumentStore, SyncConfig};
use locsync_sync::{
    on_source_deleted, reconcile_all, BatchReport, DispatchOutcome, Dispatcher, RejectReason,
    SyncMode, TargetOutcome,
};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;
use crate::protocol::{ControlRequest, ControlResponse};
use crate::watcher::{initial_scan, watch, WatchEvent, WatchKind};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Counters reported by `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuntimeStats {
    pub batches: u64,
    pub targets_written: u64,
    pub targets_failed: u64,
    pub rejected: u64,
    pub mirrors_deleted: u64,
    pub last_batch: Option<BatchReport>,
    pub last_batch_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub(crate) struct RuntimeState {
    started_at: DateTime<Utc>,
    stats: RwLock<RuntimeStats>,
    /// Paths last seen as mirrors. Their removal is not propagated.
    mirrors: Mutex<HashSet<PathBuf>>,
}

impl RuntimeState {
    pub(crate) fn new() -> Self {
        Self {
            started_at: Utc::now(),
            stats: RwLock::new(RuntimeStats::default()),
            mirrors: Mutex::new(HashSet::new()),
        }
    }

    fn mirrors(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.mirrors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remember_mirror(&self, path: &Path) {
        self.mirrors().insert(path.to_path_buf());
    }

    /// Forget `path`; returns whether it was last seen as a mirror.
    fn forget_mirror(&self, path: &Path) -> bool {
        self.mirrors().remove(path)
    }

    async fn record_batch(&self, source: &Path, report: BatchReport) {
        {
            let mut mirrors = self.mirrors();
            mirrors.remove(source);
            for target in &report.targets {
                if matches!(target.outcome, TargetOutcome::Written { .. }) {
                    mirrors.insert(target.path.clone());
                }
            }
        }

        let mut stats = self.stats.write().await;
        stats.batches += 1;
        stats.targets_written += report.written() as u64;
        stats.targets_failed += report.failed() as u64;
        stats.last_batch = Some(report);
        stats.last_batch_at = Some(Utc::now());
    }

    pub(crate) async fn stats(&self) -> RuntimeStats {
        self.stats.read().await.clone()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Start the watch runtime and block the current thread until it exits.
pub fn start_blocking(config: SyncConfig) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Build the dispatcher from `config` and run until stopped.
pub async fn run(config: SyncConfig) -> Result<(), DaemonError> {
    let store = DocumentStore::new(config.content_root()?);
    let translator = locsync_translate::from_config(&config.translator)?;
    let dispatcher = Dispatcher::new(store, translator);
    run_with(&config, dispatcher).await
}

/// Run the watch runtime around an existing dispatcher.
pub async fn run_with(config: &SyncConfig, dispatcher: Dispatcher) -> Result<(), DaemonError> {
    let state_dir = config.state_dir.clone();
    if !state_dir.exists() {
        fs::create_dir_all(&state_dir).map_err(|e| io_err(&state_dir, e))?;
    }

    let state = Arc::new(RuntimeState::new());
    let root = dispatcher.store().root().clone();
    let scan_store = dispatcher.store().clone();
    let initial = tokio::task::spawn_blocking(move || initial_scan(&scan_store))
        .await
        .map_err(|err| DaemonError::Protocol(format!("initial scan join error: {err}")))??;
    tracing::info!(
        documents = initial.len(),
        provider = ?config.translator.provider,
        "watch mode starting"
    );

    let (events_tx, events_rx) = mpsc::channel::<WatchEvent>(256);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let threshold = config.debounce();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = watch(root, threshold, initial, events_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let dispatch_handle = {
        let shutdown = shutdown_tx.clone();
        let dispatcher = dispatcher.clone();
        let state = state.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = dispatch_loop(dispatcher, state, events_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let dispatcher = dispatcher.clone();
        let state = state.clone();
        let state_dir = state_dir.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                state_dir,
                dispatcher,
                state,
                shutdown.clone(),
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, dispatch_result, socket_result, signal_result) =
        tokio::join!(watcher_handle, dispatch_handle, socket_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("dispatch_loop", dispatch_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("watch mode stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Dispatch loop
// ---------------------------------------------------------------------------

/// Single consumer of watch events. `Add`/`Change` run as independent
/// tasks; `Unlink` propagates the deletion unless the path was a mirror.
/// No failure ends the loop.
pub(crate) async fn dispatch_loop(
    dispatcher: Dispatcher,
    state: Arc<RuntimeState>,
    mut events_rx: mpsc::Receiver<WatchEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                match event.kind {
                    WatchKind::Add | WatchKind::Change => {
                        let mode = if event.kind == WatchKind::Add {
                            SyncMode::Add
                        } else {
                            SyncMode::Change
                        };
                        tokio::spawn(run_batch(dispatcher.clone(), state.clone(), event.path, mode));
                    }
                    WatchKind::Unlink => {
                        handle_unlink(&dispatcher, &state, event.path).await;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn run_batch(dispatcher: Dispatcher, state: Arc<RuntimeState>, path: PathBuf, mode: SyncMode) {
    match dispatcher.dispatch(&path, mode).await {
        Ok(DispatchOutcome::Settled(report)) => state.record_batch(&path, report).await,
        Ok(DispatchOutcome::Rejected {
            reason: RejectReason::Mirror,
            ..
        }) => state.remember_mirror(&path),
        Ok(DispatchOutcome::Rejected { reason, .. }) => {
            tracing::debug!(path = %path.display(), %reason, "event skipped");
            state.stats.write().await.rejected += 1;
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "batch failed");
        }
    }
}

async fn handle_unlink(dispatcher: &Dispatcher, state: &RuntimeState, path: PathBuf) {
    if state.forget_mirror(&path) {
        tracing::debug!(path = %path.display(), "mirror removed, not propagating");
        return;
    }

    let store = dispatcher.store().clone();
    let deleted_path = path.clone();
    let result = tokio::task::spawn_blocking(move || on_source_deleted(&store, &deleted_path)).await;
    match result {
        Ok(Ok(report)) => {
            {
                let mut mirrors = state.mirrors();
                for target in &report.targets {
                    mirrors.remove(&target.path);
                }
            }
            state.stats.write().await.mirrors_deleted += report.deleted() as u64;
        }
        Ok(Err(err)) => {
            tracing::warn!(path = %path.display(), error = %err, "deletion not propagated");
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "deletion task failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Control socket
// ---------------------------------------------------------------------------

async fn socket_server_task(
    state_dir: PathBuf,
    dispatcher: Dispatcher,
    state: Arc<RuntimeState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state_dir);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::debug!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let dispatcher = dispatcher.clone();
                let state = state.clone();
                let shutdown_tx = shutdown_tx.clone();
                let socket = socket.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_socket_client(stream, dispatcher, state, shutdown_tx, socket).await
                    {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    dispatcher: Dispatcher,
    state: Arc<RuntimeState>,
    shutdown_tx: broadcast::Sender<()>,
    socket: PathBuf,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("control socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match ControlRequest::parse(&line) {
            Ok(request) => request,
            Err(message) => {
                write_response(&mut writer, &ControlResponse::error(message)).await?;
                continue;
            }
        };
        tracing::debug!(cmd = request.name(), "control request");

        let response = match request {
            ControlRequest::Status => {
                ControlResponse::ok(build_status_payload(&dispatcher, &state, &socket).await)
            }
            ControlRequest::Reconcile => match reconcile_all(&dispatcher).await {
                Ok(report) => ControlResponse::ok(json!({
                    "scanned": report.scanned,
                    "written": report.written(),
                    "up_to_date": report.up_to_date(),
                    "failed": report.failed(),
                    "unreadable": report.errors,
                    "exit_code": report.exit_code(),
                })),
                Err(err) => ControlResponse::error(err.to_string()),
            },
            ControlRequest::Stop => {
                let _ = shutdown_tx.send(());
                ControlResponse::ok(json!({ "stopping": true }))
            }
        };

        write_response(&mut writer, &response).await?;
        if request == ControlRequest::Stop {
            break;
        }
    }

    Ok(())
}

pub(crate) async fn build_status_payload(
    dispatcher: &Dispatcher,
    state: &RuntimeState,
    socket: &Path,
) -> Value {
    let stats = state.stats().await;
    let in_flight = dispatcher.in_flight();
    let root = dispatcher.store().root();
    let in_flight_paths: Vec<String> = in_flight
        .snapshot()
        .iter()
        .map(|path| {
            root.resolve(path)
                .map(|location| location.key())
                .unwrap_or_else(|_| path.display().to_string())
        })
        .collect();

    json!({
        "running": true,
        "pid": std::process::id(),
        "started_at": state.started_at,
        "content_root": root.path().display().to_string(),
        "socket": socket.display().to_string(),
        "in_flight": in_flight_paths,
        "dropped_events": in_flight.dropped(),
        "stats": stats,
    })
}

/// Clear a socket file left behind by a daemon that did not shut down
/// cleanly. A socket that still accepts connections belongs to a live
/// daemon and is an error.
fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }
    if StdUnixStream::connect(socket).is_ok() {
        return Err(DaemonError::Protocol(format!(
            "another daemon is listening on {}",
            socket.display()
        )));
    }

    tracing::warn!(socket = %socket.display(), "removing stale control socket");
    fs::remove_file(socket).or_else(|err| match err.kind() {
        ErrorKind::NotFound => Ok(()),
        _ => Err(io_err(socket, err)),
    })
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &ControlResponse,
) -> Result<(), DaemonError> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("control socket write", e))
}

fn handle_join(
    task: &str,
    joined: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    joined.unwrap_or_else(|err| {
        Err(DaemonError::Protocol(format!("{task} task did not finish: {err}")))
    })
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use locsync_core::{ContentRoot, LocaleSet};
    use locsync_translate::MockTranslator;
    use tempfile::TempDir;

    const HELLO: &str = "---\ntitle: Привет\n---\nТекст\n";

    struct Harness {
        _tmp: TempDir,
        mock: MockTranslator,
        dispatcher: Dispatcher,
        state: Arc<RuntimeState>,
        events_tx: mpsc::Sender<WatchEvent>,
        shutdown_tx: broadcast::Sender<()>,
        handle: tokio::task::JoinHandle<Result<(), DaemonError>>,
    }

    impl Harness {
        fn start() -> Self {
            let tmp = TempDir::new().expect("tempdir");
            let mock = MockTranslator::echo();
            let store = DocumentStore::new(ContentRoot::new(tmp.path(), LocaleSet::default(), "md"));
            let dispatcher = Dispatcher::new(store, Arc::new(mock.clone()));
            let state = Arc::new(RuntimeState::new());
            let (events_tx, events_rx) = mpsc::channel(16);
            let (shutdown_tx, _) = broadcast::channel(1);
            let handle = tokio::spawn(dispatch_loop(
                dispatcher.clone(),
                state.clone(),
                events_rx,
                shutdown_tx.subscribe(),
            ));
            Self {
                _tmp: tmp,
                mock,
                dispatcher,
                state,
                events_tx,
                shutdown_tx,
                handle,
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dispatcher.store().root().path().join(rel)
        }

        fn write(&self, rel: &str, text: &str) -> PathBuf {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, text).unwrap();
            path
        }

        async fn send(&self, kind: WatchKind, path: PathBuf) {
            self.events_tx.send(WatchEvent::new(kind, path)).await.unwrap();
        }

        async fn stop(self) {
            let _ = self.shutdown_tx.send(());
            self.handle.await.unwrap().unwrap();
        }
    }

    async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
        for _ in 0..250 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {what}");
    }

    async fn batches(state: &RuntimeState) -> u64 {
        state.stats().await.batches
    }

    async fn wait_for_batches(state: &RuntimeState, expected: u64) {
        for _ in 0..250 {
            if batches(state).await >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {expected} batches");
    }

    #[tokio::test]
    async fn add_event_writes_mirrors_and_records_stats() {
        let h = Harness::start();
        let source = h.write("ru/hello.md", HELLO);

        h.send(WatchKind::Add, source).await;
        wait_for_batches(&h.state, 1).await;

        assert!(h.path("en/hello.md").exists());
        assert!(h.path("uz/hello.md").exists());
        let stats = h.state.stats().await;
        assert_eq!(stats.targets_written, 2);
        assert_eq!(stats.last_batch.unwrap().source, "ru/hello.md");
        h.stop().await;
    }

    #[tokio::test]
    async fn mirror_events_do_not_cascade() {
        let h = Harness::start();
        let source = h.write("ru/hello.md", HELLO);
        h.send(WatchKind::Add, source).await;
        wait_for_batches(&h.state, 1).await;

        // The watcher reports the mirrors the batch just wrote.
        h.send(WatchKind::Add, h.path("en/hello.md")).await;
        h.send(WatchKind::Change, h.path("uz/hello.md")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(h.mock.call_count(), 2);
        assert_eq!(batches(&h.state).await, 1);
        h.stop().await;
    }

    #[tokio::test]
    async fn unlink_of_source_deletes_mirrors_but_unlink_of_mirror_does_not() {
        let h = Harness::start();
        let source = h.write("ru/hello.md", HELLO);
        h.send(WatchKind::Add, source.clone()).await;
        wait_for_batches(&h.state, 1).await;

        // A human deletes one mirror: nothing else goes.
        fs::remove_file(h.path("uz/hello.md")).unwrap();
        h.send(WatchKind::Unlink, h.path("uz/hello.md")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(source.exists());
        assert!(h.path("en/hello.md").exists());

        // The source goes: its remaining mirror follows.
        fs::remove_file(&source).unwrap();
        h.send(WatchKind::Unlink, source).await;
        let en = h.path("en/hello.md");
        eventually("mirror deletion", || !en.exists()).await;
        assert_eq!(h.state.stats().await.mirrors_deleted, 1);
        h.stop().await;
    }

    #[tokio::test]
    async fn status_payload_reports_stats_and_in_flight() {
        let h = Harness::start();
        let source = h.write("ru/post.md", HELLO);
        h.send(WatchKind::Change, source).await;
        wait_for_batches(&h.state, 1).await;

        let socket = socket_path(&h.path(".locsync"));
        let payload = build_status_payload(&h.dispatcher, &h.state, &socket).await;
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["in_flight"], json!([]));
        assert_eq!(payload["dropped_events"], json!(0));
        assert_eq!(payload["stats"]["batches"], json!(1));
        assert_eq!(payload["stats"]["last_batch"]["source"], json!("ru/post.md"));
        h.stop().await;
    }

    #[test]
    fn stale_socket_file_is_removed_before_bind() {
        let dir = TempDir::new().unwrap();
        let socket = socket_path(dir.path());
        fs::write(&socket, b"").unwrap();

        prepare_socket_for_bind(&socket).unwrap();
        assert!(!socket.exists());
    }
}
