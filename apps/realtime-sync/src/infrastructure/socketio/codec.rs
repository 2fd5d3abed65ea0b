//! Socket.IO Frame Codec
//!
//! Decodes and encodes the text frames of Engine.IO v4 with Socket.IO v5
//! packets inside.
//!
//! # Frame Layout
//!
//! ```text
//! <engine type>[<socket type>[/<namespace>,][<ack id>][<json>]]
//!
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   open
//! 2                                                        ping
//! 3                                                        pong
//! 40                                                       connect "/"
//! 40/admin,{"token":"x"}                                   connect "/admin" with auth
//! 42["trades_updated"]                                     event, no payload
//! 4212["qtreatz_overview_updated",{"totalPool":600}]       event with ack id 12
//! ```
//!
//! Binary attachments are not supported; the backend only pushes JSON.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

/// Default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame had no content.
    #[error("empty frame")]
    Empty,

    /// Engine.IO packet type is not one of `0`-`6`.
    #[error("unknown Engine.IO packet type: {0:?}")]
    UnknownEngineType(char),

    /// Socket.IO packet type is not one of `0`-`6`.
    #[error("unknown Socket.IO packet type: {0:?}")]
    UnknownSocketType(char),

    /// JSON section failed to parse.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Packet is well-formed but its contents are not valid for its type.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// Packet uses a feature this client does not implement.
    #[error("unsupported packet: {0}")]
    Unsupported(&'static str),
}

// =============================================================================
// Packet Types
// =============================================================================

/// Engine.IO open handshake body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the server would upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    /// Maximum payload size in bytes.
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// How long the connection may stay silent before it is considered dead.
    #[must_use]
    pub const fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// Engine.IO transport packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    /// Handshake sent by the server right after the upgrade.
    Open(OpenHandshake),
    /// Transport close.
    Close,
    /// Server heartbeat; must be answered with a pong.
    Ping,
    /// Heartbeat answer.
    Pong,
    /// Socket.IO payload.
    Message(String),
    /// Transport upgrade (unused over a direct WebSocket).
    Upgrade,
    /// No-op.
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connection accepted (server) or requested (client).
    Connect {
        /// Namespace.
        namespace: String,
        /// Handshake data (server: `{"sid": ..}`, client: auth).
        data: Option<Value>,
    },
    /// Namespace disconnected.
    Disconnect {
        /// Namespace.
        namespace: String,
    },
    /// Named event.
    Event {
        /// Namespace.
        namespace: String,
        /// Acknowledgement id, if the sender expects one.
        ack_id: Option<u64>,
        /// Event name.
        name: String,
        /// Event arguments after the name.
        args: Vec<Value>,
    },
    /// Acknowledgement of an emitted event.
    Ack {
        /// Namespace.
        namespace: String,
        /// Acknowledged id.
        ack_id: u64,
        /// Acknowledgement arguments.
        args: Vec<Value>,
    },
    /// Namespace connection refused.
    ConnectError {
        /// Namespace.
        namespace: String,
        /// Error details from the server.
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// First event argument, which is what a single-argument handler sees.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Event { args, .. } => args.first(),
            _ => None,
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Text frame codec for Engine.IO v4 / Socket.IO v5.
#[derive(Debug, Default, Clone)]
pub struct SocketIoCodec;

impl SocketIoCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one Engine.IO text frame.
    ///
    /// # Errors
    ///
    /// Returns an error for empty frames, unknown packet types or an
    /// unparseable open handshake.
    pub fn decode_engine(&self, frame: &str) -> Result<EnginePacket, CodecError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(body)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping),
            '3' => Ok(EnginePacket::Pong),
            '4' => Ok(EnginePacket::Message(body.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(CodecError::UnknownEngineType(other)),
        }
    }

    /// Decode the Socket.IO packet inside an Engine.IO message.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown packet types, binary packets, invalid
    /// JSON, or events without a string name.
    pub fn decode_socket(&self, message: &str) -> Result<SocketPacket, CodecError> {
        let mut chars = message.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(CodecError::Unsupported("binary attachments"));
        }

        let (namespace, rest) = split_namespace(rest);
        let (ack_id, rest) = split_ack_id(rest);
        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest)?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let (name, args) = split_event(data)?;
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    args,
                })
            }
            '3' => {
                let ack_id = ack_id
                    .ok_or_else(|| CodecError::InvalidPacket("ack without id".to_string()))?;
                let args = match data {
                    Some(Value::Array(args)) => args,
                    _ => Vec::new(),
                };
                Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    args,
                })
            }
            '4' => Ok(SocketPacket::ConnectError { namespace, data }),
            other => Err(CodecError::UnknownSocketType(other)),
        }
    }

    /// Frame answering a server ping.
    #[must_use]
    pub const fn pong_frame(&self) -> &'static str {
        "3"
    }

    /// Frame requesting a namespace connection, with optional auth data.
    #[must_use]
    pub fn connect_frame(&self, namespace: &str, auth: Option<&Value>) -> String {
        let mut frame = String::from("40");
        push_namespace(&mut frame, namespace, auth.is_some());
        if let Some(auth) = auth {
            frame.push_str(&auth.to_string());
        }
        frame
    }

    /// Frame leaving a namespace.
    #[must_use]
    pub fn disconnect_frame(&self, namespace: &str) -> String {
        let mut frame = String::from("41");
        push_namespace(&mut frame, namespace, false);
        frame
    }

    /// Frame emitting `name` with an optional single argument.
    #[cfg(test)]
    #[must_use]
    pub fn event_frame(&self, namespace: &str, name: &str, payload: Option<&Value>) -> String {
        let mut args = vec![Value::String(name.to_string())];
        if let Some(payload) = payload {
            args.push(payload.clone());
        }

        let mut frame = String::from("42");
        push_namespace(&mut frame, namespace, true);
        frame.push_str(&Value::Array(args).to_string());
        frame
    }
}

fn push_namespace(frame: &mut String, namespace: &str, more_follows: bool) {
    if namespace != DEFAULT_NAMESPACE {
        frame.push_str(namespace);
        if more_follows {
            frame.push(',');
        }
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), rest);
    }
    match rest.find(',') {
        Some(comma) => (rest[..comma].to_string(), &rest[comma + 1..]),
        None => (rest.to_string(), ""),
    }
}

fn split_ack_id(rest: &str) -> (Option<u64>, &str) {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, rest);
    }
    (rest[..digits].parse().ok(), &rest[digits..])
}

fn split_event(data: Option<Value>) -> Result<(String, Vec<Value>), CodecError> {
    let Some(Value::Array(mut items)) = data else {
        return Err(CodecError::InvalidPacket(
            "event data must be an array".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(CodecError::InvalidPacket("event without a name".to_string()));
    }
    match items.remove(0) {
        Value::String(name) => Ok((name, items)),
        other => Err(CodecError::InvalidPacket(format!(
            "event name must be a string, got {other}"
        ))),
    }
}
