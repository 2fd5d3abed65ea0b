//! Event Handler Registry
//!
//! Maps event names to the handlers registered for them. Each registration
//! gets its own id, so cancelling one subscription removes exactly that
//! handler even when the same closure was registered twice.
//!
//! Dispatch snapshots the handler list and runs every handler on its own
//! task. Handler errors are logged and counted here and never reach the
//! connection loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::application::ports::{EventHandler, Subscription};
use crate::infrastructure::metrics;

/// Registered handlers keyed by event name.
#[derive(Default)]
pub struct EventRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(u64, EventHandler)>>>,
    failures: Arc<AtomicU64>,
}

impl EventRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler` for `event`.
    ///
    /// The subscription only holds a weak reference, so it can outlive the
    /// registry and cancel into nothing.
    pub fn register(self: &Arc<Self>, event: &str, handler: EventHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));

        tracing::trace!(event, id, "Handler registered");

        let registry: Weak<Self> = Arc::downgrade(self);
        let name = event.to_string();
        Subscription::new(event, move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(&name, id);
            }
        })
    }

    /// Remove one registration. Returns whether it was present.
    pub fn remove(&self, event: &str, id: u64) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };

        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }

        if removed {
            tracing::trace!(event, id, "Handler removed");
        }
        removed
    }

    /// Handlers currently registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Handlers registered across all events.
    #[must_use]
    pub fn total_handlers(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Event names with at least one handler, sorted.
    #[must_use]
    pub fn registrations(&self) -> Vec<String> {
        let mut events: Vec<String> = self.handlers.read().keys().cloned().collect();
        events.sort();
        events
    }

    /// Handler invocations that returned an error so far.
    #[must_use]
    pub fn handler_failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Run every handler registered for `event` with `payload`.
    ///
    /// Returns the spawned tasks; callers that do not care about completion
    /// can drop them.
    pub fn dispatch(&self, event: &str, payload: Option<Value>) -> Vec<JoinHandle<()>> {
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .get(event)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::trace!(event, "No handlers for event");
            return Vec::new();
        }

        handlers
            .into_iter()
            .map(|handler| {
                let future = handler(payload.clone());
                let failures = Arc::clone(&self.failures);
                let event = event.to_string();
                tokio::spawn(async move {
                    if let Err(e) = future.await {
                        failures.fetch_add(1, Ordering::SeqCst);
                        metrics::record_handler_failure(&event);
                        tracing::error!(event = %event, error = %e, "Event handler failed");
                    }
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.registrations())
            .field("handlers", &self.total_handlers())
            .field("failures", &self.handler_failures())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;
    use crate::application::ports::{FetchError, HandlerError, event_handler};

    fn counting(counter: &Arc<AtomicUsize>) -> EventHandler {
        let counter = Arc::clone(counter);
        event_handler(move |_payload| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    async fn join(tasks: Vec<JoinHandle<()>>) {
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn dispatch_reaches_every_handler_for_the_event() {
        let registry = Arc::new(EventRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let _a = registry.register("epoch_synced", counting(&calls));
        let _b = registry.register("epoch_synced", counting(&calls));
        let _other = registry.register("trades_updated", counting(&Arc::new(AtomicUsize::new(0))));

        join(registry.dispatch("epoch_synced", None)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handlers_receive_the_payload() {
        let registry = Arc::new(EventRegistry::new());
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let _sub = registry.register(
            "qtreatz_overview_updated",
            event_handler(move |payload| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock() = payload;
                    Ok(())
                }
            }),
        );

        join(registry.dispatch("qtreatz_overview_updated", Some(json!({ "totalPool": 600 })))).await;
        assert_eq!(*seen.lock(), Some(json!({ "totalPool": 600 })));
    }

    #[tokio::test]
    async fn cancelling_removes_only_that_registration() {
        let registry = Arc::new(EventRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting(&calls);
        let first = registry.register("trades_updated", Arc::clone(&handler));
        let _second = registry.register("trades_updated", handler);

        first.cancel();
        assert_eq!(registry.handler_count("trades_updated"), 1);

        join(registry.dispatch("trades_updated", None)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_last_subscription_forgets_the_event() {
        let registry = Arc::new(EventRegistry::new());
        let sub = registry.register("transfers_updated", counting(&Arc::new(AtomicUsize::new(0))));
        assert_eq!(registry.registrations(), vec!["transfers_updated".to_string()]);

        drop(sub);
        assert!(registry.registrations().is_empty());
        assert_eq!(registry.total_handlers(), 0);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = Arc::new(EventRegistry::new());
        let sub = registry.register("epoch_synced", counting(&Arc::new(AtomicUsize::new(0))));
        drop(registry);
        sub.cancel();
        assert!(sub.is_cancelled());
    }

    #[tokio::test]
    async fn failures_are_counted_not_propagated() {
        let registry = Arc::new(EventRegistry::new());
        let _sub = registry.register(
            "trades_updated",
            event_handler(|_payload| async {
                Err(HandlerError::Fetch(FetchError::Network("down".to_string())))
            }),
        );

        join(registry.dispatch("trades_updated", None)).await;
        join(registry.dispatch("trades_updated", None)).await;
        assert_eq!(registry.handler_failures(), 2);
    }

    #[test]
    fn unknown_event_dispatches_nothing() {
        let registry = EventRegistry::new();
        assert!(registry.dispatch("unknown", None).is_empty());
        assert!(!registry.remove("unknown", 0));
    }
}
