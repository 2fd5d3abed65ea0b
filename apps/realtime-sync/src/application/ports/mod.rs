//! Port Interfaces
//!
//! Contracts the update dispatcher depends on.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PushChannel`: connection state and named-event subscriptions
//! - `SyncDataSource`: snapshot fetches for trades and the QTREATZ overview

mod data_source;
mod push_channel;
mod subscription;

pub use data_source::{FetchError, SyncDataSource};
pub use push_channel::{EventHandler, HandlerError, HandlerFuture, PushChannel, event_handler};
pub use subscription::{Subscription, SubscriptionSet};

#[cfg(test)]
pub use data_source::MockSyncDataSource;
