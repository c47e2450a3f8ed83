use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;

use watchfolder_core::{InstanceStore, WatchSetup, YamlInstanceStore};
use watchfolder_dispatch::{
    error_chain, ChangeBatch, DebounceTask, DispatchReport, Engine, MemoryQueue,
};

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, state_dir_at, RUNNER_TICK};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::source::{absorb, RootAliases};

/// Counters exposed through `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DaemonStats {
    pub batches: u64,
    pub tasks_run: u64,
    pub tasks_failed: u64,
    pub last_batch: Option<DispatchReport>,
    pub last_batch_at: Option<DateTime<Utc>>,
}

type SharedStats = Arc<RwLock<DaemonStats>>;

/// Everything the runtime tasks share.
#[derive(Clone)]
struct DaemonContext {
    home: PathBuf,
    engine: Engine,
    queue: Arc<MemoryQueue>,
    stats: SharedStats,
    started_at: DateTime<Utc>,
}

/// Install the tracing subscriber, start a multi-threaded runtime and block
/// the current thread until the daemon stops.
pub fn start_blocking(
    home: &Path,
    setup: Arc<WatchSetup>,
    json_logs: bool,
) -> Result<(), DaemonError> {
    init_tracing(json_logs);
    let store: Arc<dyn InstanceStore> =
        Arc::new(YamlInstanceStore::new(home, Arc::clone(&setup)));
    let queue = Arc::new(MemoryQueue::new());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), setup, store, queue))
}

/// Run the daemon: watcher, task runner, control socket and signal handler.
///
/// Fails with [`DaemonError::NoRoots`] before starting anything when no root
/// is registered.
pub async fn run(
    home: PathBuf,
    setup: Arc<WatchSetup>,
    store: Arc<dyn InstanceStore>,
    queue: Arc<MemoryQueue>,
) -> Result<(), DaemonError> {
    if setup.registry().is_empty() {
        return Err(DaemonError::NoRoots);
    }
    ensure_state_dir(&home)?;

    let engine = Engine::new(Arc::clone(&setup), store, queue.clone());
    let ctx = DaemonContext {
        home,
        engine,
        queue,
        stats: Arc::new(RwLock::new(DaemonStats::default())),
        started_at: Utc::now(),
    };
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    tracing::info!(
        roots = ?setup.registry().roots(),
        latency_ms = setup.latency().as_millis() as u64,
        "watch folder daemon starting"
    );

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let result = watcher_task(ctx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let runner_handle = {
        let shutdown = shutdown_tx.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let result = task_runner_task(ctx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(ctx, shutdown.clone(), shutdown.subscribe()).await;
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
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, runner_result, socket_result, signal_result) =
        tokio::join!(watcher_handle, runner_handle, socket_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("task_runner", runner_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("watch folder daemon stopped");
    Ok(())
}

/// Watch every root recursively and dispatch one batch per latency window.
async fn watcher_task(
    ctx: DaemonContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let setup = ctx.engine.setup();
    let latency = setup.latency();
    let roots = setup.registry().roots().to_vec();
    let aliases = RootAliases::new(&roots);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event: notify::Result<Event>| {
        let _ = event_tx.send(event);
    })?;
    for root in &roots {
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching root");
    }

    let mut batch = ChangeBatch::new();
    let mut flush_at: Option<Instant> = None;

    loop {
        let deadline = flush_at.unwrap_or_else(|| Instant::now() + latency);
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if absorb(&mut batch, &aliases, &event) > 0 && flush_at.is_none() {
                    flush_at = Some(Instant::now() + latency);
                }
            }
            _ = tokio::time::sleep_until(deadline), if flush_at.is_some() => {
                flush_at = None;
                let pending = std::mem::take(&mut batch);
                if !pending.is_empty() {
                    dispatch_batch(&ctx, pending).await?;
                }
            }
        }
    }

    drop(watcher);
    Ok(())
}

/// Dispatch one batch on a blocking thread and wait for it, so batches never
/// overlap.
async fn dispatch_batch(ctx: &DaemonContext, batch: ChangeBatch) -> Result<(), DaemonError> {
    let engine = ctx.engine.clone();
    let size = batch.len();
    let report = tokio::task::spawn_blocking(move || engine.dispatch_batch(&batch))
        .await
        .map_err(|err| DaemonError::Protocol(format!("dispatch join error: {err}")))?;

    tracing::info!(
        changes = size,
        handled = report.handled,
        fired = report.fired,
        scheduled = report.scheduled,
        failed = report.failed,
        "dispatched change batch"
    );
    let mut stats = ctx.stats.write().await;
    stats.batches += 1;
    stats.last_batch = Some(report);
    stats.last_batch_at = Some(Utc::now());
    Ok(())
}

/// Drain due recheck tasks every tick; each runs on its own blocking thread.
async fn task_runner_task(
    ctx: DaemonContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(RUNNER_TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                for task in ctx.queue.take_due(Utc::now())? {
                    let engine = ctx.engine.clone();
                    let stats = ctx.stats.clone();
                    tokio::spawn(async move {
                        let ok = tokio::task::spawn_blocking(move || run_task(&engine, &task))
                            .await
                            .unwrap_or(false);
                        let mut stats = stats.write().await;
                        stats.tasks_run += 1;
                        if !ok {
                            stats.tasks_failed += 1;
                        }
                    });
                }
            }
        }
    }
    Ok(())
}

fn run_task(engine: &Engine, task: &DebounceTask) -> bool {
    match task.execute(engine) {
        Ok(outcomes) => {
            tracing::debug!(
                instance = %task.instance_id,
                kind = %task.kind,
                path = %task.path.display(),
                outcomes = outcomes.len(),
                "recheck task finished"
            );
            true
        }
        Err(err) => {
            tracing::error!(
                instance = %task.instance_id,
                kind = %task.kind,
                path = %task.path.display(),
                error = %error_chain(&err),
                "recheck task failed"
            );
            false
        }
    }
}

async fn socket_server_task(
    ctx: DaemonContext,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&ctx.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let ctx = ctx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, ctx, shutdown_tx).await {
                        tracing::error!(error = %error_chain(&err), "socket client error");
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
    ctx: DaemonContext,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request {
            DaemonRequest::Status => match build_status_payload(&ctx).await {
                Ok(payload) => DaemonResponse::ok(payload),
                Err(err) => DaemonResponse::error(error_chain(&err)),
            },
            DaemonRequest::Stop => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
        };

        write_response(&mut writer, &response).await?;
        if request == DaemonRequest::Stop {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(ctx: &DaemonContext) -> Result<Value, DaemonError> {
    let setup = ctx.engine.setup();
    let stats = ctx.stats.read().await.clone();
    let definitions: Vec<Value> = setup
        .definitions()
        .map(|def| {
            json!({
                "name": def.name(),
                "root": def.root().map(|r| r.display().to_string()),
                "folders": def.folders(),
            })
        })
        .collect();

    Ok(json!({
        "running": true,
        "started_at": ctx.started_at,
        "roots": setup
            .registry()
            .roots()
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>(),
        "definitions": definitions,
        "pending_tasks": ctx.queue.pending()?,
        "stats": stats,
        "socket": socket_path(&ctx.home).display().to_string(),
    }))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_state_dir(home: &Path) -> Result<(), DaemonError> {
    let dir = state_dir_at(home);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// `RUST_LOG`-driven subscriber, `info` by default; `json` switches to JSON
/// lines.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
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
