//! Shared State Store
//!
//! Observable cells holding the cached query results the dashboard reads.
//! Each cell is backed by a `tokio::sync::watch` channel and stamps every
//! write with a revision number, so consumers can count changes even when
//! a write repeats an earlier value or a watcher coalesces notifications.
//!
//! The update dispatcher is the only writer; views hold receivers.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::market::{QTreatzOverview, Trade};

// =============================================================================
// Store Cell
// =============================================================================

/// A value together with the revision that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision<T> {
    /// Write counter, starting at 0 for the initial value.
    pub revision: u64,
    /// The stored value.
    pub value: T,
}

/// Single observable cell.
#[derive(Debug)]
pub struct StoreCell<T> {
    tx: watch::Sender<Revision<T>>,
}

impl<T: Clone> StoreCell<T> {
    /// Create a cell holding `initial` at revision 0.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            tx: watch::Sender::new(Revision {
                revision: 0,
                value: initial,
            }),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.tx.borrow().value.clone()
    }

    /// Current value and revision.
    #[must_use]
    pub fn snapshot(&self) -> Revision<T> {
        self.tx.borrow().clone()
    }

    /// Number of writes since creation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.tx.borrow().revision
    }

    /// Replace the value wholesale. Always notifies subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_modify(|current| {
            current.revision += 1;
            current.value = value;
        });
    }

    /// Read-modify-write under the cell's lock. Always notifies subscribers.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.tx.send_modify(|current| {
            current.revision += 1;
            current.value = f(&current.value);
        });
    }

    /// Watch the cell. The receiver starts with the current value marked seen.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Revision<T>> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default> Default for StoreCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// =============================================================================
// Sync Store
// =============================================================================

/// The cells written by the update dispatcher.
#[derive(Debug, Default)]
pub struct SyncStore {
    /// Latest trade list, replaced on every successful fetch.
    pub trades: StoreCell<Vec<Trade>>,
    /// Edge-triggered "something changed, re-fetch" toggle.
    pub refetch: StoreCell<bool>,
    /// Latest QTREATZ overview snapshot, empty until first loaded.
    pub qtreatz_overview: StoreCell<Option<QTreatzOverview>>,
}

/// Store shared between the dispatcher, views and the status server.
pub type SharedSyncStore = Arc<SyncStore>;

impl SyncStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the trade list.
    pub fn replace_trades(&self, trades: Vec<Trade>) {
        self.trades.set(trades);
    }

    /// Flip the refetch toggle, producing one observable edge.
    pub fn flip_refetch(&self) {
        self.refetch.update(|current| !*current);
    }

    /// Replace the overview snapshot.
    pub fn replace_qtreatz_overview(&self, overview: QTreatzOverview) {
        self.qtreatz_overview.set(Some(overview));
    }
}
