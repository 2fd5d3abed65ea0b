//! Application Layer - Ports, shared store and the update dispatcher.
//!
//! This layer defines what the synchronization logic needs from the
//! outside world (a push channel and a data source) and the store it
//! writes into. Infrastructure adapters implement the ports.

/// Port interfaces for the push channel and backend fetches.
pub mod ports;

/// Observable cells shared with the view layer.
pub mod store;

/// The update dispatcher.
pub mod services;
