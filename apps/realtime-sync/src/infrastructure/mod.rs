//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the ambient
//! service plumbing (configuration, tracing, metrics, status endpoint).

/// Socket.IO client implementing the push channel port.
pub mod socketio;

/// HTTP client implementing the data source port.
pub mod backend;

/// Environment-driven configuration.
pub mod config;

/// Status and metrics HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry export.
pub mod telemetry;
