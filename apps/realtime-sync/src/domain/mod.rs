//! Domain Layer - Push events, connection state and cached data shapes.
//!
//! Everything here is plain data with serialization support. The shapes
//! are owned by the backend contract; this layer only names them.

/// Named push events and connection state.
pub mod events;

/// Cached data records (trades, QTREATZ overview).
pub mod market;
