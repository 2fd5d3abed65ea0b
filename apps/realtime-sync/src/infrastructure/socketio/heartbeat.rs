//! Heartbeat Monitor
//!
//! Engine.IO v4 heartbeats are driven by the server: it sends a ping every
//! `pingInterval` and the client answers with a pong. The client only has
//! to notice when pings stop arriving. If nothing is heard for
//! `pingInterval + pingTimeout` the connection is considered dead and the
//! client reconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::codec::OpenHandshake;

/// Smallest interval between liveness checks.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for heartbeat monitoring.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval at which the server promised to ping.
    pub ping_interval: Duration,
    /// Grace period on top of the interval.
    pub ping_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(20),
        }
    }
}

impl HeartbeatConfig {
    /// Create a configuration with explicit values.
    #[must_use]
    pub const fn new(ping_interval: Duration, ping_timeout: Duration) -> Self {
        Self {
            ping_interval,
            ping_timeout,
        }
    }

    /// Take the values the server announced in its open handshake.
    #[must_use]
    pub const fn from_handshake(handshake: &OpenHandshake) -> Self {
        Self {
            ping_interval: Duration::from_millis(handshake.ping_interval),
            ping_timeout: Duration::from_millis(handshake.ping_timeout),
        }
    }

    /// Maximum silence before the connection is declared dead.
    #[must_use]
    pub fn liveness_window(&self) -> Duration {
        self.ping_interval.saturating_add(self.ping_timeout)
    }

    fn check_interval(&self) -> Duration {
        (self.ping_timeout / 4).max(MIN_CHECK_INTERVAL)
    }
}

/// Events emitted by the heartbeat monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// No ping arrived within the liveness window.
    Timeout {
        /// How long the server has been silent.
        silent_for: Duration,
    },
}

/// State shared between the monitor and the frame reader.
#[derive(Debug)]
pub struct HeartbeatState {
    last_ping: RwLock<Instant>,
    pings: AtomicU64,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create state as if a ping had just arrived.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_ping: RwLock::new(Instant::now()),
            pings: AtomicU64::new(0),
        }
    }

    /// Record a server ping.
    pub fn record_ping(&self) {
        *self.last_ping.write() = Instant::now();
        self.pings.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the last ping (or since creation).
    #[must_use]
    pub fn time_since_ping(&self) -> Duration {
        self.last_ping.read().elapsed()
    }

    /// Number of pings seen on this connection.
    #[must_use]
    pub fn ping_count(&self) -> u64 {
        self.pings.load(Ordering::Relaxed)
    }
}

/// Watches [`HeartbeatState`] and reports a timeout once.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a new monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or a timeout has been reported.
    pub async fn run(self) {
        let window = self.config.liveness_window();
        let mut interval = tokio::time::interval(self.config.check_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::trace!("Heartbeat monitor cancelled");
                    return;
                }
                _ = interval.tick() => {
                    let silent_for = self.state.time_since_ping();
                    if silent_for > window {
                        tracing::warn!(
                            silent_ms = silent_for.as_millis(),
                            window_ms = window.as_millis(),
                            "Server heartbeat missed"
                        );
                        let _ = self.event_tx.send(HeartbeatEvent::Timeout { silent_for }).await;
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_socket_io_server_defaults() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.liveness_window(), Duration::from_secs(45));
    }

    #[test]
    fn config_from_handshake() {
        let handshake = OpenHandshake {
            sid: "s".to_string(),
            upgrades: vec![],
            ping_interval: 1_000,
            ping_timeout: 500,
            max_payload: None,
        };
        let config = HeartbeatConfig::from_handshake(&handshake);
        assert_eq!(config.liveness_window(), Duration::from_millis(1_500));
    }

    #[test]
    fn check_interval_has_a_floor() {
        let config = HeartbeatConfig::new(Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(config.check_interval(), MIN_CHECK_INTERVAL);
    }

    #[test]
    fn record_ping_resets_silence() {
        let state = HeartbeatState::new();
        *state.last_ping.write() = Instant::now()
            .checked_sub(Duration::from_secs(5))
            .unwrap();
        assert!(state.time_since_ping() >= Duration::from_secs(5));

        state.record_ping();
        assert!(state.time_since_ping() < Duration::from_secs(1));
        assert_eq!(state.ping_count(), 1);
    }

    #[tokio::test]
    async fn monitor_reports_silence() {
        let config = HeartbeatConfig::new(Duration::from_millis(20), Duration::from_millis(20));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatMonitor::new(config, Arc::clone(&state), event_tx, cancel).run(),
        );

        let event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
            .await
            .expect("should time out")
            .expect("channel open");
        let HeartbeatEvent::Timeout { silent_for } = event;
        assert!(silent_for > Duration::from_millis(40));

        handle.await.expect("monitor exits after reporting");
    }

    #[tokio::test]
    async fn monitor_stays_quiet_while_pinged() {
        let config = HeartbeatConfig::new(Duration::from_millis(40), Duration::from_millis(40));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatMonitor::new(config, Arc::clone(&state), event_tx, cancel.clone()).run(),
        );

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            state.record_ping();
        }
        assert!(event_rx.try_recv().is_err());

        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("monitor shuts down on cancellation")
            .unwrap();
    }
}
