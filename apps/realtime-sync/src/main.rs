//! QX Realtime Sync Binary
//!
//! Connects to the backend push endpoint and keeps the shared caches fresh.
//! Cache changes are logged in place of a view layer.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin qx-realtime-sync
//! ```
//!
//! # Environment Variables
//!
//! - `BACKEND_API_URL`: backend REST base, absolute or a path such as
//!   `/api` on the fallback origin; the push endpoint is this with its
//!   first `/api` removed (default: unset)
//! - `QX_API_URL`: QX API base (default: <https://api.qubic.org/v1/qx>)
//! - `SYNC_FALLBACK_ORIGIN`: origin used when `BACKEND_API_URL` is unset
//!   or relative (default: <http://localhost:3000>)
//! - `SYNC_AUTO_CONNECT`: connect on start (default: true)
//! - `SYNC_RECONNECT_DELAY_INITIAL_MS`, `SYNC_RECONNECT_DELAY_MAX_SECS`,
//!   `SYNC_RECONNECT_DELAY_MULTIPLIER`, `SYNC_MAX_RECONNECT_ATTEMPTS`:
//!   reconnect backoff (default: 1000 ms, 5 s, 2.0, unlimited)
//! - `SYNC_CONNECT_TIMEOUT_SECS`: handshake timeout (default: 20)
//! - `SYNC_HTTP_TIMEOUT_SECS`: fetch timeout (default: 10)
//! - `SYNC_HEALTH_PORT`: status server port (default: 8090)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: log filter (default: `qx_realtime_sync=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use qx_realtime_sync::infrastructure::metrics;
use qx_realtime_sync::{
    BackendClient, HealthServer, HealthServerState, PushChannel, SharedSyncStore, SocketIoClient,
    SocketIoClientConfig, SyncConfig, SyncStore, Trade, TradeSide, UpdateDispatcher,
    init_metrics, init_telemetry,
};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Time allowed for tasks to wind down after a shutdown signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("a rustls crypto provider is already installed"))?;

    load_dotenv();

    let _telemetry_guard = init_telemetry().context("failed to initialize tracing")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting QX realtime sync");

    init_metrics().context("failed to install metrics recorder")?;

    let config = SyncConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let store: SharedSyncStore = Arc::new(SyncStore::new());

    let backend = Arc::new(BackendClient::from_config(&config)?);

    let client = Arc::new(SocketIoClient::new(
        SocketIoClientConfig::from_settings(config.socket_url(), &config.socket),
        shutdown_token.clone(),
    ));

    let dispatcher = Arc::new(UpdateDispatcher::new(
        Arc::clone(&client) as Arc<dyn PushChannel>,
        backend,
        Arc::clone(&store),
    ));

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&client) as Arc<dyn PushChannel>,
        client.registry(),
        dispatcher.stats(),
        Arc::clone(&store),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    let mut tasks = JoinSet::new();

    let socket_client = Arc::clone(&client);
    tasks.spawn(async move {
        if let Err(e) = socket_client.run().await {
            tracing::error!(error = %e, "Socket.IO client stopped with error");
        }
    });

    tasks.spawn(Arc::clone(&dispatcher).run(shutdown_token.clone()));

    tasks.spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Status server error");
        }
    });

    tasks.spawn(log_cache_changes(Arc::clone(&store), shutdown_token.clone()));

    tracing::info!("Realtime sync ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        tracing::warn!("Tasks did not stop in time, aborting");
        tasks.abort_all();
    }

    tracing::info!("Realtime sync stopped");
    Ok(())
}

/// Log every store write, standing in for the views that would re-render.
async fn log_cache_changes(store: SharedSyncStore, cancel: CancellationToken) {
    let mut trades = store.trades.subscribe();
    let mut refetch = store.refetch.subscribe();
    let mut overview = store.qtreatz_overview.subscribe();

    let mut seen_trades = store.trades.revision();
    let mut seen_refetch = store.refetch.revision();
    let mut seen_overview = store.qtreatz_overview.revision();

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            Ok(()) = trades.changed() => {
                let current = trades.borrow_and_update().clone();
                record_writes("trades", &mut seen_trades, current.revision);
                let buys = current.value.iter().filter(|t| t.side() == Some(TradeSide::Buy)).count();
                let volume = current.value.iter().filter_map(Trade::total).fold(0, u64::saturating_add);
                tracing::info!(
                    revision = current.revision,
                    count = current.value.len(),
                    buys,
                    volume,
                    "Trades cache updated"
                );
            }
            Ok(()) = refetch.changed() => {
                let current = refetch.borrow_and_update().clone();
                let edges = record_writes("refetch", &mut seen_refetch, current.revision);
                tracing::info!(revision = current.revision, edges, value = current.value, "Refetch signal flipped");
            }
            Ok(()) = overview.changed() => {
                let current = overview.borrow_and_update().clone();
                record_writes("qtreatz_overview", &mut seen_overview, current.revision);
                tracing::info!(
                    revision = current.revision,
                    fields = current.value.as_ref().map_or(0, |o| o.len()),
                    "QTREATZ overview updated"
                );
            }
            else => return,
        }
    }
}

fn record_writes(cell: &'static str, seen: &mut u64, revision: u64) -> u64 {
    let writes = revision.saturating_sub(*seen);
    *seen = revision;
    metrics::record_cache_write(cell, writes);
    writes
}

/// Load .env from the current directory or the nearest ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

fn log_config(config: &SyncConfig) {
    tracing::info!(
        socket_url = %config.socket_url(),
        backend_api = %config.backend_api_base(),
        qx_api = %config.http.qx_api_url,
        auto_connect = config.socket.auto_connect,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        reconnect_initial_ms = config.socket.reconnect_delay_initial.as_millis(),
        reconnect_max_ms = config.socket.reconnect_delay_max.as_millis(),
        max_reconnect_attempts = config.socket.max_reconnect_attempts,
        connect_timeout_secs = config.socket.connect_timeout.as_secs(),
        http_timeout_secs = config.http.timeout.as_secs(),
        "Connection settings"
    );
}

/// Wait for Ctrl+C or SIGTERM, then cancel everything.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
