//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, watch};

use qx_realtime_sync::{
    ConnectionState, ConnectionStatus, EventHandler, EventRegistry, FetchError, PushChannel,
    QTreatzOverview, Subscription, SyncDataSource, Trade,
};

// =============================================================================
// Push Channel
// =============================================================================

/// In-memory push channel driven by the test.
pub struct FakeChannel {
    pub registry: Arc<EventRegistry>,
    status: watch::Sender<ConnectionStatus>,
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(EventRegistry::new()),
            status: watch::Sender::new(ConnectionStatus::default()),
        })
    }

    /// Enter a new connected session.
    pub fn connect(&self) -> u64 {
        let mut session = 0;
        self.status.send_modify(|status| {
            session = status.session + 1;
            *status = ConnectionStatus::connected(session);
        });
        session
    }

    pub fn disconnect(&self) {
        self.status
            .send_modify(|status| *status = status.with_state(ConnectionState::Disconnected));
    }

    /// Deliver an event and wait for every handler to finish.
    pub async fn push(&self, event: &str, payload: Option<Value>) -> usize {
        let tasks = self.registry.dispatch(event, payload);
        let count = tasks.len();
        for task in tasks {
            task.await.unwrap();
        }
        count
    }
}

impl PushChannel for FakeChannel {
    fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn on(&self, event: &str, handler: EventHandler) -> Subscription {
        self.registry.register(event, handler)
    }
}

// =============================================================================
// Data Source
// =============================================================================

/// Data source answering from scripted queues.
///
/// An empty trades queue answers `[]`; an empty overview queue answers with
/// a network error.
#[derive(Default)]
pub struct FakeSource {
    trades: Mutex<VecDeque<Result<Vec<Trade>, FetchError>>>,
    overviews: Mutex<VecDeque<Result<QTreatzOverview, FetchError>>>,
    trades_gate: Mutex<Option<Arc<Notify>>>,
    pub trades_calls: AtomicUsize,
    pub overview_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_trades(&self, trades: Result<Vec<Trade>, FetchError>) {
        self.trades.lock().push_back(trades);
    }

    pub fn push_overview(&self, overview: Result<QTreatzOverview, FetchError>) {
        self.overviews.lock().push_back(overview);
    }

    /// Make every following trades fetch wait for the returned notify.
    pub fn gate_trades(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.trades_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn trades_calls(&self) -> usize {
        self.trades_calls.load(Ordering::SeqCst)
    }

    pub fn overview_calls(&self) -> usize {
        self.overview_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncDataSource for FakeSource {
    async fn fetch_trades(&self) -> Result<Vec<Trade>, FetchError> {
        self.trades_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.trades_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.trades.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_qtreatz_overview(&self) -> Result<QTreatzOverview, FetchError> {
        self.overview_calls.fetch_add(1, Ordering::SeqCst);
        self.overviews
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Network("no scripted response".to_string())))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Poll `check` until it holds, failing after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn overview(value: Value) -> QTreatzOverview {
    QTreatzOverview::from_payload(Some(&value)).expect("object or array payload")
}

pub fn trades(value: Value) -> Vec<Trade> {
    serde_json::from_value(value).expect("trade list")
}
