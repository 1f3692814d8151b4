//! Server push transport.
//!
//! - `socket`: the duplex socket seam (`Connector`, `Duplex`) and its
//!   `tokio-tungstenite` implementation
//! - `connection`: the `Connecting/Open/Closed` lifecycle and the single
//!   driver task that owns the live socket and feeds the event bus

pub mod connection;
pub mod socket;

use std::time::Duration;

pub use connection::{Connection, ConnectionState, Lifecycle, LifecycleAction, ReconnectPolicy};
pub use socket::{Connector, Duplex, Frame, WebSocketConnector};

/// Default delay between a drop and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default WebSocket handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("websocket handshake rejected with HTTP {status}")]
    Handshake { status: u16 },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connect timeout after {0:?}")]
    Timeout(Duration),
}
