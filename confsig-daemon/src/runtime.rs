//! Sidecar runtime: long-poll watcher + periodic timer + reload coordinator
//! + child wait, all under one broadcast shutdown.
//!
//! Event flow:
//!
//! ```text
//! long-poll ──┐
//!             ├─► check-now (cap 1, coalescing) ─► coordinator ─► reload
//! timer ──────┘                                    (reconcile)    (cap 1)
//!                                                                   │
//!                                                     SIGHUP ◄──────┘
//! ```
//!
//! Both channels are bounded at one slot and written with `try_send`: a full
//! channel means an equivalent event is already pending, and reconciliation
//! is idempotent, so the new event is dropped rather than queued. No emitter
//! ever blocks on a slow consumer.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};

use confsig_core::Settings;
use confsig_renderer::Renderer;
use confsig_store::{ConsulStore, KvStore, PollOutcome};
use confsig_sync::reconciler::reconcile;

use crate::error::DaemonError;
use crate::supervisor::{self, SupervisedProcess};

/// Server-side cap on one long-poll call; the store ends a healthy poll
/// before the client's own timeout does.
const LONG_POLL_WAIT: Duration = Duration::from_secs(55);

/// Back-off after a failed long-poll, so a flapping or unreachable store
/// does not spin the loop.
const POLL_ERROR_COOLDOWN: Duration = Duration::from_secs(60);

/// Delay between the child's exit and cancellation of background loops.
const EXIT_GRACE_PERIOD: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Start the sidecar runtime and block the current thread until the
/// supervised process exits.
pub fn start_blocking(
    settings: Settings,
    command: Vec<String>,
) -> Result<ExitStatus, DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| DaemonError::Runtime(format!("tokio runtime: {e}")))?;
    runtime.block_on(run(settings, command))
}

/// Run the sidecar: initial reconcile, child launch, watcher/coordinator
/// loops, shutdown after child exit. Returns the child's exit status.
pub async fn run(settings: Settings, command: Vec<String>) -> Result<ExitStatus, DaemonError> {
    let (program, args) = resolve_command(&settings, command)?;
    let store: Arc<dyn KvStore> = Arc::new(ConsulStore::new(&settings.consul_addr));
    let renderer = Arc::new(Renderer::new());
    let key = settings.consul_key.clone();
    let config_path = settings.app_config_path.clone();

    // One synchronous reconciliation before the child starts, so it never
    // launches against a stale or missing file. Failure here is fatal.
    reconcile(store.as_ref(), &renderer, &key, &config_path).await?;

    let mut process = SupervisedProcess::start(&program, &args)?;
    let pid = process.pid().ok_or(DaemonError::ChildGone)?;
    tracing::info!(pid, program = %program, "supervised process started");

    let (check_tx, check_rx) = mpsc::channel::<()>(1);
    let (reload_tx, reload_rx) = mpsc::channel::<()>(1);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let long_poll_handle = {
        let shutdown = shutdown_tx.clone();
        let store = store.clone();
        let key = key.clone();
        let check_tx = check_tx.clone();
        tokio::spawn(async move {
            let result = long_poll_task(store, key, check_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let timer_handle = {
        let shutdown = shutdown_tx.clone();
        let period = settings.check_interval;
        tokio::spawn(async move {
            let result = timer_task(period, check_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let coordinator_handle = {
        let shutdown = shutdown_tx.clone();
        let store = store.clone();
        let renderer = renderer.clone();
        tokio::spawn(async move {
            let result = coordinator_task(
                store,
                renderer,
                key,
                config_path,
                check_rx,
                reload_tx,
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let reload_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = reload_task(pid, reload_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let mut shutdown_rx = shutdown_tx.subscribe();
    let exited = tokio::select! {
        status = process.wait() => Some(status?),
        _ = shutdown_rx.recv() => None,
    };
    let status = match exited {
        Some(status) => {
            tracing::info!(status = %status, "supervised process exited");
            tokio::time::sleep(EXIT_GRACE_PERIOD).await;
            status
        }
        None => {
            tracing::error!("background task stopped unexpectedly; terminating supervised process");
            process.terminate().await?
        }
    };

    let _ = shutdown_tx.send(());
    let (long_poll, timer, coordinator, reload) = tokio::join!(
        long_poll_handle,
        timer_handle,
        coordinator_handle,
        reload_handle
    );
    handle_join("long-poll", long_poll)?;
    handle_join("timer", timer)?;
    handle_join("coordinator", coordinator)?;
    handle_join("reload", reload)?;

    Ok(status)
}

/// Command line wins; `app` from the settings file is the fallback.
fn resolve_command(
    settings: &Settings,
    command: Vec<String>,
) -> Result<(String, Vec<String>), DaemonError> {
    let mut command = command.into_iter();
    match command.next() {
        Some(program) => Ok((program, command.collect())),
        None => match &settings.app {
            Some(app) => Ok((app.clone(), Vec::new())),
            None => Err(DaemonError::NoCommand),
        },
    }
}

// ---------------------------------------------------------------------------
// Change watcher — long-poll loop + periodic timer
// ---------------------------------------------------------------------------

/// Repeatedly long-poll the store; emit a check-now signal whenever the
/// stored version moves past the last one seen.
async fn long_poll_task(
    store: Arc<dyn KvStore>,
    key: String,
    check_tx: mpsc::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    // 0 accepts any version as news; the first successful poll calibrates it.
    let mut last_known_version = 0u64;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = store.block_until_changed(&key, last_known_version, LONG_POLL_WAIT) => {
                match result {
                    Ok(PollOutcome::Changed(entry)) => {
                        tracing::info!(version = entry.version, "change observed during long-poll");
                        last_known_version = entry.version;
                        emit_check(&check_tx)?;
                    }
                    Ok(PollOutcome::Unchanged) => {
                        // The wait itself was the delay; loop immediately.
                        tracing::debug!("nothing new during polling interval");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "long-poll failed; backing off");
                        tokio::select! {
                            _ = shutdown_rx.recv() => break,
                            _ = tokio::time::sleep(POLL_ERROR_COOLDOWN) => {}
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Unconditional check-now on a fixed interval — the safety net against
/// missed or silently-dropped long-poll notifications.
async fn timer_task(
    period: Duration,
    check_tx: mpsc::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the first immediate tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                tracing::debug!("periodic check-now");
                emit_check(&check_tx)?;
            }
        }
    }

    Ok(())
}

/// Non-blocking emit with coalescing: a full channel already carries an
/// equivalent pending signal, so the new one is dropped.
fn emit_check(check_tx: &mpsc::Sender<()>) -> Result<(), DaemonError> {
    match check_tx.try_send(()) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(())) => {
            tracing::debug!("check-now already pending; coalesced");
            Ok(())
        }
        Err(TrySendError::Closed(())) => Err(DaemonError::ChannelClosed("check-now")),
    }
}

// ---------------------------------------------------------------------------
// Reload coordinator + delivery
// ---------------------------------------------------------------------------

/// Consume check-now signals strictly sequentially — one reconciliation in
/// flight at a time, so bursts collapse into the latest remote state — and
/// request a reload only when the file actually changed.
async fn coordinator_task(
    store: Arc<dyn KvStore>,
    renderer: Arc<Renderer>,
    key: String,
    config_path: PathBuf,
    mut check_rx: mpsc::Receiver<()>,
    reload_tx: mpsc::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_check = check_rx.recv() => {
                let Some(()) = maybe_check else { break };
                match reconcile(store.as_ref(), &renderer, &key, &config_path).await {
                    Ok(outcome) if outcome.changed() => {
                        match reload_tx.try_send(()) {
                            Ok(()) => {}
                            // A pending reload already covers this change.
                            Err(TrySendError::Full(())) => {
                                tracing::debug!("reload already pending; coalesced");
                            }
                            Err(TrySendError::Closed(())) => {
                                return Err(DaemonError::ChannelClosed("reload"));
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(err) if err.is_retryable() => {
                        tracing::warn!(error = %err, "reconciliation failed; retrying on next trigger");
                    }
                    // The config path itself is unavailable; that assumption
                    // is load-bearing, so the runtime comes down.
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    Ok(())
}

/// Deliver reload signals one at a time. Delivery failure is logged, not
/// fatal: the signal is a hint and the next change will retry.
async fn reload_task(
    pid: i32,
    mut reload_rx: mpsc::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_reload = reload_rx.recv() => {
                let Some(()) = maybe_reload else { break };
                match supervisor::send_reload_signal(pid) {
                    Ok(()) => tracing::info!(pid, "reload signal delivered"),
                    Err(err) => tracing::error!(error = %err, pid, "reload signal failed"),
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::sync::mpsc::error::TryRecvError;

    use confsig_renderer::EnvLookup;
    use confsig_store::MemoryStore;

    fn make_settings(config_path: &Path) -> Settings {
        Settings {
            app: Some("/bin/true".to_string()),
            app_config_path: config_path.to_path_buf(),
            consul_key: "cfg".to_string(),
            consul_addr: "127.0.0.1:1".to_string(),
            check_interval: Duration::from_secs(50 * 60),
        }
    }

    fn empty_env_renderer() -> Arc<Renderer> {
        let lookup: EnvLookup = Arc::new(|_| None);
        Arc::new(Renderer::with_env(lookup))
    }

    struct CoordinatorHarness {
        store: MemoryStore,
        check_tx: mpsc::Sender<()>,
        reload_rx: mpsc::Receiver<()>,
        handle: tokio::task::JoinHandle<Result<(), DaemonError>>,
        _shutdown_tx: broadcast::Sender<()>,
    }

    fn spawn_coordinator(config_path: &Path) -> CoordinatorHarness {
        let store = MemoryStore::new();
        let (check_tx, check_rx) = mpsc::channel::<()>(1);
        let (reload_tx, reload_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let handle = tokio::spawn(coordinator_task(
            Arc::new(store.clone()),
            empty_env_renderer(),
            "cfg".to_string(),
            config_path.to_path_buf(),
            check_rx,
            reload_tx,
            shutdown_tx.subscribe(),
        ));

        CoordinatorHarness {
            store,
            check_tx,
            reload_rx,
            handle,
            _shutdown_tx: shutdown_tx,
        }
    }

    async fn expect_reload(rx: &mut mpsc::Receiver<()>) {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("reload expected")
            .expect("reload channel open");
    }

    async fn expect_no_reload(rx: &mut mpsc::Receiver<()>) {
        let outcome = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(outcome.is_err(), "no reload expected");
    }

    // ─── Coalescing ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn rapid_emits_coalesce_into_one_pending_check() {
        let (check_tx, mut check_rx) = mpsc::channel::<()>(1);

        for _ in 0..5 {
            emit_check(&check_tx).expect("emit");
        }

        assert!(check_rx.try_recv().is_ok(), "one signal must be pending");
        assert!(
            matches!(check_rx.try_recv(), Err(TryRecvError::Empty)),
            "bursts must collapse to a single pending signal"
        );
    }

    #[tokio::test]
    async fn emit_into_closed_channel_is_an_error() {
        let (check_tx, check_rx) = mpsc::channel::<()>(1);
        drop(check_rx);
        let err = emit_check(&check_tx).expect_err("must fail");
        assert!(matches!(err, DaemonError::ChannelClosed("check-now")));
    }

    // ─── Coordinator: signal-on-change only ────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn reload_requested_exactly_once_per_change() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("app.yml");
        let mut h = spawn_coordinator(&path);

        h.store.put("cfg", "v1");
        h.check_tx.send(()).await.expect("check");
        expect_reload(&mut h.reload_rx).await;

        // Same remote state: reconcile reports unchanged, no reload.
        h.check_tx.send(()).await.expect("check");
        expect_no_reload(&mut h.reload_rx).await;

        // New remote state: exactly one more reload.
        h.store.put("cfg", "v2");
        h.check_tx.send(()).await.expect("check");
        expect_reload(&mut h.reload_rx).await;
        expect_no_reload(&mut h.reload_rx).await;

        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_checks_reflects_latest_state_only() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("app.yml");
        let mut h = spawn_coordinator(&path);

        h.store.put("cfg", "v1");
        h.check_tx.send(()).await.expect("seed check");
        expect_reload(&mut h.reload_rx).await;

        // Several rapid remote updates, each trying to trigger a check; the
        // bounded channel coalesces and the single reconcile sees only the
        // final value.
        h.store.put("cfg", "v2");
        h.store.put("cfg", "v3");
        h.store.put("cfg", "v4");
        for _ in 0..4 {
            emit_check(&h.check_tx).expect("emit");
        }

        expect_reload(&mut h.reload_rx).await;
        tokio::task::yield_now().await;

        let persisted = confsig_sync::read_persisted(&path).expect("read");
        assert_eq!(persisted.content, "v4");

        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_errors_do_not_stop_the_coordinator() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("app.yml");
        let mut h = spawn_coordinator(&path);

        // Key missing: error for this attempt, no reload, loop survives.
        h.check_tx.send(()).await.expect("check");
        expect_no_reload(&mut h.reload_rx).await;

        h.store.put("cfg", "now present");
        h.check_tx.send(()).await.expect("check");
        expect_reload(&mut h.reload_rx).await;

        h.handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn config_path_io_failure_is_fatal_to_the_coordinator() {
        let dir = TempDir::new().expect("tempdir");
        // The "file" is a directory: reads fail with a non-NotFound error.
        let h = spawn_coordinator(dir.path());

        h.store.put("cfg", "v1");
        h.check_tx.send(()).await.expect("check");

        let result = tokio::time::timeout(Duration::from_secs(5), h.handle)
            .await
            .expect("coordinator must stop")
            .expect("join");
        assert!(matches!(result, Err(DaemonError::Sync(_))));
    }

    // ─── Timer ─────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn timer_emits_on_every_period() {
        let (check_tx, mut check_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let period = Duration::from_secs(600);

        let handle = tokio::spawn(timer_task(period, check_tx, shutdown_tx.subscribe()));

        // Auto-advance carries virtual time to each tick while we await.
        for _ in 0..3 {
            tokio::time::timeout(period * 2, check_rx.recv())
                .await
                .expect("tick expected")
                .expect("channel open");
        }

        let _ = shutdown_tx.send(());
        handle.await.expect("join").expect("timer task");
    }

    // ─── Long-poll loop ────────────────────────────────────────────────────

    #[tokio::test]
    async fn long_poll_emits_on_version_advance() {
        let store = MemoryStore::new();
        let (check_tx, mut check_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let handle = tokio::spawn(long_poll_task(
            Arc::new(store.clone()),
            "cfg".to_string(),
            check_tx,
            shutdown_tx.subscribe(),
        ));

        store.put("cfg", "v1");
        tokio::time::timeout(Duration::from_secs(5), check_rx.recv())
            .await
            .expect("first change")
            .expect("channel open");

        store.put("cfg", "v2");
        tokio::time::timeout(Duration::from_secs(5), check_rx.recv())
            .await
            .expect("second change")
            .expect("channel open");

        let _ = shutdown_tx.send(());
        handle.await.expect("join").expect("long-poll task");
    }

    // ─── Command resolution ────────────────────────────────────────────────

    #[test]
    fn command_line_beats_settings_app() {
        let dir = TempDir::new().expect("tempdir");
        let settings = make_settings(&dir.path().join("app.yml"));

        let (program, args) = resolve_command(
            &settings,
            vec!["/bin/server".to_string(), "--flag".to_string()],
        )
        .expect("resolve");
        assert_eq!(program, "/bin/server");
        assert_eq!(args, vec!["--flag".to_string()]);
    }

    #[test]
    fn settings_app_is_the_fallback() {
        let dir = TempDir::new().expect("tempdir");
        let settings = make_settings(&dir.path().join("app.yml"));

        let (program, args) = resolve_command(&settings, Vec::new()).expect("resolve");
        assert_eq!(program, "/bin/true");
        assert!(args.is_empty());
    }

    #[test]
    fn no_command_anywhere_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let mut settings = make_settings(&dir.path().join("app.yml"));
        settings.app = None;

        let err = resolve_command(&settings, Vec::new()).expect_err("must fail");
        assert!(matches!(err, DaemonError::NoCommand));
    }

    // ─── End-to-end run ────────────────────────────────────────────────────

    #[tokio::test]
    #[cfg(unix)]
    async fn run_performs_initial_reconcile_and_returns_child_status() {
        // The in-memory store cannot reach `run` (it builds a ConsulStore),
        // so drive the same sequence `run` performs, against a real child.
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("app.yml");
        let store = MemoryStore::new();
        store.put("cfg", "listen: :9090\n");
        let renderer = empty_env_renderer();

        reconcile(&store, &renderer, "cfg", &path)
            .await
            .expect("initial reconcile");
        assert!(path.exists(), "child must start against a fresh file");

        let mut process =
            SupervisedProcess::start("/bin/sh", &["-c".to_string(), "exit 3".to_string()])
                .expect("spawn");
        let status = process.wait().await.expect("wait");
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn run_fails_fast_when_initial_reconcile_fails() {
        let dir = TempDir::new().expect("tempdir");
        let settings = make_settings(&dir.path().join("app.yml"));

        // Unroutable store address: the initial reconcile errors out before
        // any child is spawned.
        let result = tokio::time::timeout(Duration::from_secs(30), run(settings, Vec::new())).await;
        match result {
            Ok(Err(DaemonError::Sync(_))) => {}
            Ok(other) => panic!("expected a sync error, got {other:?}"),
            Err(_) => panic!("initial reconcile must fail fast"),
        }
    }
}
