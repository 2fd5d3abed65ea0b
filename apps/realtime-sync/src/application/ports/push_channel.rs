//! Push Channel Port (Driven Port)
//!
//! The connection manager contract: one persistent connection to the
//! backend push endpoint, its state, and per-event handler registration.
//!
//! Handlers may run at any time after registration, in the order events
//! arrive. Delivery of the same logical update more than once is possible,
//! so handlers must be safe to re-apply.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::watch;

use super::data_source::FetchError;
use super::subscription::Subscription;
use crate::domain::events::ConnectionStatus;

/// Error returned by an event handler. Surfaced by the channel as a failed
/// handler task; it never affects the connection.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A re-fetch triggered by the event failed.
    #[error("refetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Future produced by one handler invocation.
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// Callback run once per pushed occurrence of an event, with its payload.
pub type EventHandler = Arc<dyn Fn(Option<Value>) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`].
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

/// Port for the push-notification connection.
pub trait PushChannel: Send + Sync {
    /// Watch the connection status. Updated on every transport change.
    fn connection_status(&self) -> watch::Receiver<ConnectionStatus>;

    /// Whether the channel is connected right now.
    fn is_connected(&self) -> bool {
        self.connection_status().borrow().is_connected()
    }

    /// Register `handler` for `event`. The returned subscription removes
    /// exactly this handler when cancelled or dropped.
    fn on(&self, event: &str, handler: EventHandler) -> Subscription;
}
