//! Socket.IO Client
//!
//! Holds one Socket.IO connection to the backend over a plain WebSocket
//! transport and implements the [`PushChannel`] port on top of it.
//!
//! # Endpoint
//!
//! The configured `http(s)://host[:port][/namespace]` URL becomes
//! `ws(s)://host[:port]/socket.io/?EIO=4&transport=websocket`. A non-root
//! path selects the namespace, the way browser clients treat it.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (error) -> Disconnected
//!                     ^                                     |
//!                     +----------- Reconnecting <-----------+
//! ```
//!
//! Every transition into `Connected` starts a new session number.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{Notify, mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::codec::{CodecError, DEFAULT_NAMESPACE, EnginePacket, OpenHandshake, SocketIoCodec, SocketPacket};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::registry::EventRegistry;
use crate::application::ports::{EventHandler, PushChannel, Subscription};
use crate::domain::events::{ConnectionState, ConnectionStatus};
use crate::infrastructure::config::SocketSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum SocketIoClientError {
    /// Configured URL cannot be turned into a WebSocket endpoint.
    #[error("invalid socket URL {url:?}: {reason}")]
    InvalidUrl {
        /// Configured URL.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Upgrade and namespace handshake did not finish in time.
    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Frame could not be decoded during the handshake.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Server refused the namespace connection.
    #[error("namespace connection rejected: {0}")]
    ConnectRejected(String),

    /// Server closed the namespace.
    #[error("server disconnected the namespace")]
    ServerDisconnect,

    /// Server stopped sending heartbeats.
    #[error("no heartbeat for {0:?}")]
    HeartbeatTimeout(Duration),

    /// Transport closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Reconnection attempts exhausted.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

impl SocketIoClientError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::WebSocket(_) => "websocket",
            Self::Codec(_) => "codec",
            Self::ConnectRejected(_) => "connect_rejected",
            Self::ServerDisconnect => "server_disconnect",
            Self::HeartbeatTimeout(_) => "heartbeat_timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::MaxReconnectAttemptsExceeded => "max_reconnect_attempts",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Socket.IO client.
#[derive(Debug, Clone)]
pub struct SocketIoClientConfig {
    /// Server URL (`http`, `https`, `ws` or `wss`).
    pub url: String,
    /// Connect as soon as [`SocketIoClient::run`] starts.
    pub auto_connect: bool,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Time allowed for upgrade plus namespace handshake.
    pub connect_timeout: Duration,
}

impl SocketIoClientConfig {
    /// Configuration with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_connect: true,
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(20),
        }
    }

    /// Configuration from the socket section of the service settings.
    #[must_use]
    pub fn from_settings(url: impl Into<String>, settings: &SocketSettings) -> Self {
        Self {
            url: url.into(),
            auto_connect: settings.auto_connect,
            reconnect: ReconnectConfig::from_socket_settings(settings),
            connect_timeout: settings.connect_timeout,
        }
    }

    /// WebSocket endpoint for the configured URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or uses another scheme.
    pub fn endpoint(&self) -> Result<Url, SocketIoClientError> {
        let mut url = self.parsed_url()?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(self.invalid(format!("unsupported scheme {other:?}")));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| self.invalid("cannot switch to a WebSocket scheme"))?;
        url.set_path("/socket.io/");
        url.set_query(Some("EIO=4&transport=websocket"));
        url.set_fragment(None);
        Ok(url)
    }

    /// Namespace selected by the URL path.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse.
    pub fn namespace(&self) -> Result<String, SocketIoClientError> {
        let url = self.parsed_url()?;
        let path = url.path().trim_end_matches('/');
        Ok(if path.is_empty() {
            DEFAULT_NAMESPACE.to_string()
        } else {
            path.to_string()
        })
    }

    fn parsed_url(&self) -> Result<Url, SocketIoClientError> {
        Url::parse(&self.url).map_err(|e| self.invalid(e.to_string()))
    }

    fn invalid(&self, reason: impl Into<String>) -> SocketIoClientError {
        SocketIoClientError::InvalidUrl {
            url: self.url.clone(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Socket.IO Client
// =============================================================================

/// Socket.IO client implementing [`PushChannel`].
///
/// Handlers registered with [`PushChannel::on`] survive reconnects; the
/// registry belongs to the client, not to a connection.
pub struct SocketIoClient {
    config: SocketIoClientConfig,
    codec: SocketIoCodec,
    registry: Arc<EventRegistry>,
    status: watch::Sender<ConnectionStatus>,
    connect_requested: Notify,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl SocketIoClient {
    /// Create a client. Nothing happens until [`run`](Self::run) is spawned.
    #[must_use]
    pub fn new(config: SocketIoClientConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            codec: SocketIoCodec::new(),
            registry: Arc::new(EventRegistry::new()),
            status: watch::Sender::new(ConnectionStatus::default()),
            connect_requested: Notify::new(),
            running: AtomicBool::new(false),
            cancel,
        }
    }

    /// Start connecting when `auto_connect` was off. No-op otherwise.
    pub fn connect(&self) {
        self.connect_requested.notify_one();
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Handler registry shared by all connections of this client.
    #[must_use]
    pub fn registry(&self) -> Arc<EventRegistry> {
        Arc::clone(&self.registry)
    }

    /// Run the connection loop until cancelled or attempts are exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SocketIoClientError::InvalidUrl`] for a bad URL and
    /// [`SocketIoClientError::MaxReconnectAttemptsExceeded`] when the
    /// reconnect budget runs out.
    pub async fn run(self: Arc<Self>) -> Result<(), SocketIoClientError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Socket.IO client already running");
            return Ok(());
        }

        let endpoint = self.config.endpoint()?;
        let namespace = self.config.namespace()?;

        if !self.config.auto_connect {
            tracing::info!("Waiting for explicit connect");
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                () = self.connect_requested.notified() => {}
            }
        }

        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let result = loop {
            if self.cancel.is_cancelled() {
                break Ok(());
            }

            match self.connect_and_run(&endpoint, &namespace, &mut policy).await {
                Ok(()) => break Ok(()),
                Err(e) => {
                    metrics::record_connection_error(e.kind());
                    tracing::warn!(error = %e, "Socket.IO connection lost");
                    self.set_state(ConnectionState::Disconnected);

                    let Some(delay) = policy.next_delay() else {
                        break Err(SocketIoClientError::MaxReconnectAttemptsExceeded);
                    };

                    self.set_state(ConnectionState::Reconnecting);
                    metrics::record_reconnect();
                    tracing::info!(
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to Socket.IO server"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => break Ok(()),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Socket.IO client stopped");
        result
    }

    async fn connect_and_run(
        &self,
        endpoint: &Url,
        namespace: &str,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), SocketIoClientError> {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(endpoint = %endpoint, namespace, "Connecting to Socket.IO server");

        let timeout = self.config.connect_timeout;
        let (mut write, mut read, open) = tokio::time::timeout(timeout, async {
            let (ws_stream, _response) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;
            let (mut write, mut read) = ws_stream.split();
            let open = self.handshake(&mut read, &mut write, namespace).await?;
            Ok::<_, SocketIoClientError>((write, read, open))
        })
        .await
        .map_err(|_| SocketIoClientError::ConnectTimeout(timeout))??;

        policy.reset();
        let session = self.mark_connected();
        tracing::info!(
            session,
            sid = %open.sid,
            ping_interval_ms = open.ping_interval,
            ping_timeout_ms = open.ping_timeout,
            "Socket.IO connected"
        );

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(1);
        let heartbeat_cancel = self.cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();
        tokio::spawn(
            HeartbeatMonitor::new(
                HeartbeatConfig::from_handshake(&open),
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel,
            )
            .run(),
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    if let Err(e) = write
                        .send(Message::Text(self.codec.disconnect_frame(namespace).into()))
                        .await
                    {
                        tracing::debug!(error = %e, "Failed to leave namespace on shutdown");
                    }
                    if let Err(e) = write.close().await {
                        tracing::debug!(error = %e, "Failed to close WebSocket on shutdown");
                    }
                    return Ok(());
                }
                event = heartbeat_rx.recv() => {
                    if let Some(HeartbeatEvent::Timeout { silent_for }) = event {
                        return Err(SocketIoClientError::HeartbeatTimeout(silent_for));
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(text.as_str(), namespace, &heartbeat_state, &mut write)
                                .await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Server sent close frame");
                            return Err(SocketIoClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(SocketIoClientError::ConnectionClosed),
                    }
                }
            }
        }
    }

    async fn handshake<R, W>(
        &self,
        read: &mut R,
        write: &mut W,
        namespace: &str,
    ) -> Result<OpenHandshake, SocketIoClientError>
    where
        R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let mut open = None;

        loop {
            let text = next_text(read).await?;
            match self.codec.decode_engine(&text)? {
                EnginePacket::Open(handshake) => {
                    tracing::debug!(sid = %handshake.sid, "Engine.IO open");
                    let frame = self.codec.connect_frame(namespace, None);
                    write.send(Message::Text(frame.into())).await?;
                    open = Some(handshake);
                }
                EnginePacket::Ping => {
                    write.send(Message::Text(self.codec.pong_frame().into())).await?;
                }
                EnginePacket::Close => return Err(SocketIoClientError::ConnectionClosed),
                EnginePacket::Message(body) => match self.codec.decode_socket(&body)? {
                    SocketPacket::Connect { namespace: ns, .. } if ns == namespace => {
                        return open.ok_or_else(|| {
                            CodecError::InvalidPacket("connect before open".to_string()).into()
                        });
                    }
                    SocketPacket::ConnectError { namespace: ns, data } if ns == namespace => {
                        let reason = data.map(|d| d.to_string()).unwrap_or_default();
                        return Err(SocketIoClientError::ConnectRejected(reason));
                    }
                    other => tracing::trace!(?other, "Ignoring packet during handshake"),
                },
                EnginePacket::Pong | EnginePacket::Upgrade | EnginePacket::Noop => {}
            }
        }
    }

    async fn handle_frame<W>(
        &self,
        text: &str,
        namespace: &str,
        heartbeat: &HeartbeatState,
        write: &mut W,
    ) -> Result<(), SocketIoClientError>
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let packet = match self.codec.decode_engine(text) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(error = %e, frame = text, "Undecodable Engine.IO frame");
                return Ok(());
            }
        };

        match packet {
            EnginePacket::Ping => {
                heartbeat.record_ping();
                write.send(Message::Text(self.codec.pong_frame().into())).await?;
            }
            EnginePacket::Close => return Err(SocketIoClientError::ConnectionClosed),
            EnginePacket::Message(body) => match self.codec.decode_socket(&body) {
                Ok(packet) => self.handle_packet(packet, namespace)?,
                Err(e) => tracing::warn!(error = %e, frame = text, "Undecodable Socket.IO packet"),
            },
            EnginePacket::Open(_) | EnginePacket::Pong | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
        Ok(())
    }

    fn handle_packet(&self, packet: SocketPacket, namespace: &str) -> Result<(), SocketIoClientError> {
        match &packet {
            SocketPacket::Event { namespace: ns, name, .. } if ns == namespace => {
                metrics::record_event_received(name);
                let tasks = self.registry.dispatch(name, packet.payload().cloned());
                tracing::debug!(event = %name, handlers = tasks.len(), "Event received");
            }
            SocketPacket::Disconnect { namespace: ns } if ns == namespace => {
                return Err(SocketIoClientError::ServerDisconnect);
            }
            other => tracing::trace!(?other, "Ignoring packet"),
        }
        Ok(())
    }

    fn mark_connected(&self) -> u64 {
        let mut session = 0;
        self.status.send_modify(|status| {
            session = status.session + 1;
            *status = ConnectionStatus::connected(session);
        });
        metrics::set_connection_state(ConnectionState::Connected);
        session
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            *status = status.with_state(state);
            true
        });
        metrics::set_connection_state(state);
    }
}

impl PushChannel for SocketIoClient {
    fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn on(&self, event: &str, handler: EventHandler) -> Subscription {
        self.registry.register(event, handler)
    }
}

async fn next_text<R>(read: &mut R) -> Result<String, SocketIoClientError>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_string()),
            Some(Ok(Message::Close(_))) | None => return Err(SocketIoClientError::ConnectionClosed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
