//! Push Events and Connection State
//!
//! The closed set of server-pushed events the synchronization layer reacts
//! to, and the connection status published by the push channel.

use std::fmt;

// =============================================================================
// Named Events
// =============================================================================

/// Server-pushed event names handled by the update dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedEvent {
    /// New trades are available; re-fetch the trade list.
    TradesUpdated,
    /// Transfers changed; downstream views re-fetch their own data.
    TransfersUpdated,
    /// The backend finished syncing an epoch.
    EpochSynced,
    /// A fresh QTREATZ overview snapshot, carried in the payload.
    QTreatzOverviewUpdated,
}

impl NamedEvent {
    /// Every handled event, in registration order.
    pub const ALL: [Self; 4] = [
        Self::TradesUpdated,
        Self::TransfersUpdated,
        Self::EpochSynced,
        Self::QTreatzOverviewUpdated,
    ];

    /// Wire name of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TradesUpdated => "trades_updated",
            Self::TransfersUpdated => "transfers_updated",
            Self::EpochSynced => "epoch_synced",
            Self::QTreatzOverviewUpdated => "qtreatz_overview_updated",
        }
    }

    /// Look up an event by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

impl fmt::Display for NamedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Transport-level state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and none in progress.
    #[default]
    Disconnected,
    /// Transport handshake in progress.
    Connecting,
    /// Handshake complete, events are flowing.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// State name for logs and status output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Connection state plus the session it belongs to.
///
/// `session` increments on every transition into [`ConnectionState::Connected`],
/// so a watcher that only samples the latest value can still tell two
/// connected periods apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Current transport state.
    pub state: ConnectionState,
    /// Number of the most recent connected session (0 = never connected).
    pub session: u64,
}

impl ConnectionStatus {
    /// Status for a freshly established session.
    #[must_use]
    pub const fn connected(session: u64) -> Self {
        Self {
            state: ConnectionState::Connected,
            session,
        }
    }

    /// Same session number, new state.
    #[must_use]
    pub const fn with_state(self, state: ConnectionState) -> Self {
        Self {
            state,
            session: self.session,
        }
    }

    /// Whether events are currently flowing.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_round_trip() {
        for event in NamedEvent::ALL {
            assert_eq!(NamedEvent::from_name(event.as_str()), Some(event));
        }
    }

    #[test]
    fn unknown_event_name() {
        assert_eq!(NamedEvent::from_name("orders_updated"), None);
        assert_eq!(NamedEvent::from_name("TRADES_UPDATED"), None);
    }

    #[test]
    fn only_connected_counts_as_connected() {
        assert!(ConnectionStatus::connected(1).is_connected());
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
        ] {
            assert!(!ConnectionStatus::connected(1).with_state(state).is_connected());
        }
    }

    #[test]
    fn with_state_keeps_session() {
        let status = ConnectionStatus::connected(7).with_state(ConnectionState::Reconnecting);
        assert_eq!(status.session, 7);
        assert_eq!(status.state.as_str(), "reconnecting");
    }
}
