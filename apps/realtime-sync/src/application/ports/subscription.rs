//! Subscription Handles
//!
//! Handles returned by [`PushChannel::on`](super::PushChannel::on). A handle
//! deregisters its handler when cancelled or dropped; cancelling twice, or
//! after the channel itself is gone, is a no-op.

use std::fmt;

use parking_lot::Mutex;

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle to one registered event handler.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    event: String,
    cancel: Mutex<Option<CancelFn>>,
}

impl Subscription {
    /// Create a handle that runs `cancel` at most once.
    pub fn new(event: impl Into<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            event: event.into(),
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Event this handle was registered for.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Unregister the handler. Idempotent.
    pub fn cancel(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether [`cancel`](Self::cancel) has already run.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.lock().is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Subscriptions acquired together and released together.
///
/// Dropping the set cancels everything registered so far, which covers an
/// activation abandoned halfway through.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Track a subscription.
    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Number of tracked subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether no subscriptions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Event names in registration order.
    #[must_use]
    pub fn events(&self) -> Vec<&str> {
        self.subscriptions.iter().map(Subscription::event).collect()
    }

    /// Cancel and forget every tracked subscription.
    pub fn cancel_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
