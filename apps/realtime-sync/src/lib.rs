#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! QX Realtime Sync - Push-driven cache synchronization
//!
//! Keeps the dashboard's cached query results in step with the backend by
//! listening to Socket.IO push events instead of polling.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: event names, connection state, cached record shapes
//!   - `events`: `NamedEvent`, `ConnectionState`, `ConnectionStatus`
//!   - `market`: `Trade`, `QTreatzOverview`
//!
//! - **Application**: ports, the shared store and the dispatcher
//!   - `ports`: `PushChannel`, `SyncDataSource`, `Subscription`
//!   - `store`: revisioned watch cells for trades, refetch toggle, overview
//!   - `services`: `UpdateDispatcher`
//!
//! - **Infrastructure**: adapters and service plumbing
//!   - `socketio`: Socket.IO client over WebSocket
//!   - `backend`: `reqwest` client for the QX API and backend
//!   - `config`, `telemetry`, `metrics`, `health`
//!
//! # Data Flow
//!
//! ```text
//! backend --42["trades_updated"]--> SocketIoClient --dispatch--> handler
//!                                                                  |
//!             BackendClient::fetch_trades <-------------------------+
//!                        |
//!                        +--> SyncStore.trades --watch--> views
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Event names and cached data shapes.
pub mod domain;

/// Application layer - Ports, store and dispatcher.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::events::{ConnectionState, ConnectionStatus, NamedEvent};
pub use domain::market::{QTreatzOverview, Trade, TradeSide};

// Ports and store
pub use application::ports::{
    EventHandler, FetchError, HandlerError, PushChannel, Subscription, SubscriptionSet,
    SyncDataSource, event_handler,
};
pub use application::store::{Revision, SharedSyncStore, StoreCell, SyncStore};

// Dispatcher
pub use application::services::{DispatcherStats, UpdateDispatcher};

// Adapters
pub use infrastructure::backend::BackendClient;
pub use infrastructure::socketio::{
    EventRegistry, SocketIoClient, SocketIoClientConfig, SocketIoClientError,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, HttpSettings, ServerSettings, SocketSettings, SyncConfig,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
