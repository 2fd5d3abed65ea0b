//! Update Dispatcher
//!
//! Subscribes to the named push events while the push channel is connected
//! and turns each occurrence into exactly one store write.
//!
//! # Lifecycle
//!
//! ```text
//! INACTIVE --connected--> ACTIVE --not connected | teardown--> INACTIVE
//! ```
//!
//! Entering ACTIVE runs one eager overview fetch and registers the four
//! handlers. Leaving ACTIVE cancels them. Every new connected session
//! repeats the full activation; events missed while disconnected are only
//! covered by the fresh fetch, never replayed.
//!
//! In-flight fetches are not cancelled on disconnect. A `trades_updated`
//! fetch that completes after the channel dropped still replaces the trade
//! list.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    EventHandler, PushChannel, SubscriptionSet, SyncDataSource, event_handler,
};
use crate::application::store::SharedSyncStore;
use crate::domain::events::{ConnectionStatus, NamedEvent};
use crate::domain::market::QTreatzOverview;
use crate::infrastructure::metrics;

// =============================================================================
// Stats
// =============================================================================

/// Counters describing the dispatcher's activation history.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    activations: AtomicU64,
    deactivations: AtomicU64,
    bootstrap_failures: AtomicU64,
    active_session: AtomicU64,
}

impl DispatcherStats {
    /// Number of activation cycles started.
    #[must_use]
    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::SeqCst)
    }

    /// Number of activation cycles torn down.
    #[must_use]
    pub fn deactivations(&self) -> u64 {
        self.deactivations.load(Ordering::SeqCst)
    }

    /// Number of eager overview fetches that failed.
    #[must_use]
    pub fn bootstrap_failures(&self) -> u64 {
        self.bootstrap_failures.load(Ordering::SeqCst)
    }

    /// Session of the live cycle, 0 when inactive.
    #[must_use]
    pub fn active_session(&self) -> u64 {
        self.active_session.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Active Cycle
// =============================================================================

struct ActiveCycle {
    session: u64,
    subscriptions: SubscriptionSet,
    // Detached on deactivation; the fetch is allowed to finish.
    _bootstrap: JoinHandle<()>,
}

// =============================================================================
// Update Dispatcher
// =============================================================================

/// Keeps the shared store in step with server-pushed events.
pub struct UpdateDispatcher {
    channel: Arc<dyn PushChannel>,
    source: Arc<dyn SyncDataSource>,
    store: SharedSyncStore,
    stats: Arc<DispatcherStats>,
}

impl UpdateDispatcher {
    /// Create a dispatcher writing into `store`.
    #[must_use]
    pub fn new(
        channel: Arc<dyn PushChannel>,
        source: Arc<dyn SyncDataSource>,
        store: SharedSyncStore,
    ) -> Self {
        Self {
            channel,
            source,
            store,
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    /// Whether the push channel is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Shared activation counters.
    #[must_use]
    pub fn stats(&self) -> Arc<DispatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Follow the channel's connection status until cancelled or the
    /// channel goes away, activating and deactivating as it changes.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut status_rx = self.channel.connection_status();
        let mut active: Option<ActiveCycle> = None;

        loop {
            let status = *status_rx.borrow_and_update();
            self.reconcile(&mut active, status);

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Update dispatcher cancelled");
                    break;
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Push channel dropped its status sender");
                        break;
                    }
                }
            }
        }

        self.deactivate(&mut active, "teardown");
    }

    fn reconcile(&self, active: &mut Option<ActiveCycle>, status: ConnectionStatus) {
        if let Some(cycle) = active.as_ref()
            && status.is_connected()
            && cycle.session == status.session
        {
            return;
        }

        let reason = if status.is_connected() {
            "new session"
        } else {
            status.state.as_str()
        };
        self.deactivate(active, reason);

        if status.is_connected() {
            *active = Some(self.activate(status.session));
        }
    }

    fn activate(&self, session: u64) -> ActiveCycle {
        self.stats.activations.fetch_add(1, Ordering::SeqCst);
        self.stats.active_session.store(session, Ordering::SeqCst);
        metrics::record_activation();

        let bootstrap = self.spawn_overview_bootstrap(session);

        let mut subscriptions = SubscriptionSet::new();
        for event in NamedEvent::ALL {
            let handler = self.handler_for(event);
            subscriptions.push(self.channel.on(event.as_str(), handler));
        }

        tracing::info!(
            session,
            handlers = subscriptions.len(),
            "Realtime updates activated"
        );

        ActiveCycle {
            session,
            subscriptions,
            _bootstrap: bootstrap,
        }
    }

    fn deactivate(&self, active: &mut Option<ActiveCycle>, reason: &str) {
        let Some(mut cycle) = active.take() else {
            return;
        };

        let released = cycle.subscriptions.len();
        cycle.subscriptions.cancel_all();
        self.stats.deactivations.fetch_add(1, Ordering::SeqCst);
        self.stats.active_session.store(0, Ordering::SeqCst);

        tracing::info!(
            session = cycle.session,
            released,
            reason,
            "Realtime updates deactivated"
        );
    }

    fn spawn_overview_bootstrap(&self, session: u64) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            match source.fetch_qtreatz_overview().await {
                Ok(overview) => {
                    tracing::debug!(session, fields = overview.len(), "QTREATZ overview loaded");
                    store.replace_qtreatz_overview(overview);
                }
                Err(e) => {
                    stats.bootstrap_failures.fetch_add(1, Ordering::SeqCst);
                    metrics::record_bootstrap_failure();
                    tracing::warn!(session, error = %e, "Failed to fetch QTREATZ overview");
                }
            }
        })
    }

    fn handler_for(&self, event: NamedEvent) -> EventHandler {
        let store = Arc::clone(&self.store);

        match event {
            NamedEvent::TradesUpdated => {
                let source = Arc::clone(&self.source);
                event_handler(move |_payload| {
                    let source = Arc::clone(&source);
                    let store = Arc::clone(&store);
                    async move {
                        tracing::info!(%event, "Refetching trades");
                        let trades = source.fetch_trades().await?;
                        tracing::debug!(count = trades.len(), "Trades cache replaced");
                        store.replace_trades(trades);
                        Ok(())
                    }
                })
            }
            NamedEvent::TransfersUpdated | NamedEvent::EpochSynced => {
                event_handler(move |_payload| {
                    let store = Arc::clone(&store);
                    async move {
                        tracing::info!(%event, "Triggering refetch");
                        store.flip_refetch();
                        Ok(())
                    }
                })
            }
            NamedEvent::QTreatzOverviewUpdated => event_handler(move |payload| {
                let store = Arc::clone(&store);
                async move {
                    if let Some(overview) = QTreatzOverview::from_payload(payload.as_ref()) {
                        tracing::debug!(fields = overview.len(), "QTREATZ overview pushed");
                        store.replace_qtreatz_overview(overview);
                    }
                    Ok(())
                }
            }),
        }
    }
}
