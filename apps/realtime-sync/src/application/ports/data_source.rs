//! Data Source Port (Driven Port)
//!
//! Opaque request/response fetches returning the full current snapshot of
//! a resource. No pagination or delta parameters.

use async_trait::async_trait;

use crate::domain::market::{QTreatzOverview, Trade};

/// Fetch error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Request never produced a response (connect, timeout, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Port for fetching authoritative snapshots from the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncDataSource: Send + Sync {
    /// Fetch the current trade list.
    async fn fetch_trades(&self) -> Result<Vec<Trade>, FetchError>;

    /// Fetch the current QTREATZ overview snapshot.
    async fn fetch_qtreatz_overview(&self) -> Result<QTreatzOverview, FetchError>;
}
