//! Socket.IO Push Channel
//!
//! Engine.IO v4 / Socket.IO v5 over a direct WebSocket transport.
//!
//! # Components
//!
//! - `codec`: text frame encoding and decoding
//! - `heartbeat`: detects a server that stopped pinging
//! - `reconnect`: backoff between connection attempts
//! - `registry`: per-event handler lists and dispatch
//! - `client`: the connection loop, implementing `PushChannel`

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod reconnect;
pub mod registry;

pub use client::{SocketIoClient, SocketIoClientConfig, SocketIoClientError};
pub use codec::{CodecError, EnginePacket, OpenHandshake, SocketIoCodec, SocketPacket};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use registry::EventRegistry;
