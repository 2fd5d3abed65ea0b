//! Status and Metrics Endpoint
//!
//! HTTP endpoint reporting push channel state, dispatcher activity and
//! cache revisions, plus Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status
//! - `GET /healthz` - liveness probe (always OK while the process runs)
//! - `GET /readyz` - readiness probe (OK only while connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::PushChannel;
use crate::application::services::DispatcherStats;
use crate::application::store::SharedSyncStore;
use crate::domain::events::ConnectionState;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::socketio::EventRegistry;

// =============================================================================
// Response Types
// =============================================================================

/// `/health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Seconds since the status server state was created.
    pub uptime_secs: u64,
    /// Time of the report.
    pub current_time: DateTime<Utc>,
    /// Push channel state.
    pub connection: ConnectionInfo,
    /// Dispatcher counters.
    pub dispatcher: DispatcherInfo,
    /// Store cell revisions.
    pub cache: CacheInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Connected; events are flowing.
    Healthy,
    /// Connecting or waiting to reconnect.
    Degraded,
    /// Not connected and not trying.
    Unhealthy,
}

impl HealthStatus {
    const fn from_state(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Healthy,
            ConnectionState::Connecting | ConnectionState::Reconnecting => Self::Degraded,
            ConnectionState::Disconnected => Self::Unhealthy,
        }
    }
}

/// Push channel state.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// State name.
    pub state: &'static str,
    /// Whether events are flowing.
    pub connected: bool,
    /// Most recent session number.
    pub session: u64,
}

/// Dispatcher counters.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherInfo {
    /// Activation cycles started.
    pub activations: u64,
    /// Activation cycles torn down.
    pub deactivations: u64,
    /// Failed eager overview fetches.
    pub bootstrap_failures: u64,
    /// Handlers currently registered.
    pub registered_handlers: usize,
    /// Handler invocations that failed.
    pub handler_failures: u64,
}

/// Store cell summary.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    /// Trades cell revision.
    pub trades_revision: u64,
    /// Trades currently cached.
    pub trades_count: usize,
    /// Refetch toggle revision (number of flips).
    pub refetch_revision: u64,
    /// Overview cell revision.
    pub qtreatz_overview_revision: u64,
    /// Whether an overview is cached.
    pub qtreatz_overview_present: bool,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the status server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    channel: Arc<dyn PushChannel>,
    registry: Arc<EventRegistry>,
    stats: Arc<DispatcherStats>,
    store: SharedSyncStore,
}

impl HealthServerState {
    /// Create status server state.
    #[must_use]
    pub fn new(
        version: String,
        channel: Arc<dyn PushChannel>,
        registry: Arc<EventRegistry>,
        stats: Arc<DispatcherStats>,
        store: SharedSyncStore,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            channel,
            registry,
            stats,
            store,
        }
    }

    /// Build the `/health` body.
    #[must_use]
    pub fn report(&self) -> HealthResponse {
        let status = *self.channel.connection_status().borrow();
        let trades = self.store.trades.snapshot();
        let overview = self.store.qtreatz_overview.snapshot();

        HealthResponse {
            status: HealthStatus::from_state(status.state),
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            connection: ConnectionInfo {
                state: status.state.as_str(),
                connected: status.is_connected(),
                session: status.session,
            },
            dispatcher: DispatcherInfo {
                activations: self.stats.activations(),
                deactivations: self.stats.deactivations(),
                bootstrap_failures: self.stats.bootstrap_failures(),
                registered_handlers: self.registry.total_handlers(),
                handler_failures: self.registry.handler_failures(),
            },
            cache: CacheInfo {
                trades_revision: trades.revision,
                trades_count: trades.value.len(),
                refetch_revision: self.store.refetch.revision(),
                qtreatz_overview_revision: overview.revision,
                qtreatz_overview_present: overview.value.is_some(),
            },
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Status HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a status server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Router with all status routes.
    #[must_use]
    pub fn router(state: Arc<HealthServerState>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the server stops
    /// with an error.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Status server listening");
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::ServerFailed` if the server stops with
    /// an error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Status server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = state.report();
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.channel.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

// =============================================================================
// Errors
// =============================================================================

/// Status server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::watch;

    use super::*;
    use crate::application::ports::{EventHandler, Subscription};
    use crate::application::store::SyncStore;
    use crate::domain::events::ConnectionStatus;
    use crate::domain::market::QTreatzOverview;

    struct StaticChannel(watch::Sender<ConnectionStatus>);

    impl PushChannel for StaticChannel {
        fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
            self.0.subscribe()
        }

        fn on(&self, event: &str, _handler: EventHandler) -> Subscription {
            Subscription::new(event, || {})
        }
    }

    fn state(status: ConnectionStatus) -> (Arc<HealthServerState>, SharedSyncStore) {
        let store = Arc::new(SyncStore::new());
        let state = HealthServerState::new(
            "test".to_string(),
            Arc::new(StaticChannel(watch::Sender::new(status))),
            Arc::new(EventRegistry::new()),
            Arc::new(DispatcherStats::default()),
            Arc::clone(&store),
        );
        (Arc::new(state), store)
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_connection_state() {
        assert_eq!(
            HealthStatus::from_state(ConnectionState::Connected),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthStatus::from_state(ConnectionState::Reconnecting),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::from_state(ConnectionState::Disconnected),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn report_includes_cache_revisions() {
        let (state, store) = state(ConnectionStatus::connected(3));
        store.flip_refetch();
        store.flip_refetch();
        store.replace_qtreatz_overview(
            QTreatzOverview::from_payload(Some(&json!({ "totalPool": 1 }))).unwrap(),
        );

        let report = state.report();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.connection.session, 3);
        assert_eq!(report.cache.refetch_revision, 2);
        assert!(report.cache.qtreatz_overview_present);
        assert_eq!(report.cache.trades_count, 0);
    }

    #[tokio::test]
    async fn readiness_requires_connection() {
        let (connected, _) = state(ConnectionStatus::connected(1));
        let response = readiness_handler(State(connected)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let (disconnected, _) = state(ConnectionStatus::default());
        let response = readiness_handler(State(disconnected)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_is_unavailable_while_disconnected() {
        let (state, _) = state(ConnectionStatus::default());
        let response = health_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
