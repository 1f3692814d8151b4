//! Duplex socket primitive.
//!
//! The connection driver only sees `Connector` and `Duplex`, so tests can
//! script frames without a network and the WebSocket details stay here.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use super::{TransportError, DEFAULT_CONNECT_TIMEOUT};

/// A frame surfaced to the connection driver. Ping/pong and raw frames are
/// handled below this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<String>),
}

/// One open duplex connection.
#[async_trait]
pub trait Duplex: Send {
    /// Next inbound frame, or `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Close the connection. Must be safe to call on an already closed socket.
    async fn close(&mut self);
}

/// Opens duplex connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Duplex>, TransportError>;
}

// ============================================================================
// WebSocket implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Duplex>, TransportError> {
        debug!("opening websocket to {url}");
        let connected = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(url),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.connect_timeout))?;

        match connected {
            Ok((stream, _response)) => Ok(Box::new(WebSocketDuplex {
                stream,
                closed: false,
            })),
            Err(tungstenite::Error::Http(response)) => Err(TransportError::Handshake {
                status: response.status().as_u16(),
            }),
            Err(e) => Err(TransportError::Connection(e.to_string())),
        }
    }
}

struct WebSocketDuplex {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Duplex for WebSocketDuplex {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Protocol(e.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(Frame::Text(text))),
                Message::Binary(data) => return Some(Ok(Frame::Binary(data))),
                Message::Close(frame) => {
                    self.closed = true;
                    let reason = frame
                        .map(|f| format!("{} (code {})", f.reason, u16::from(f.code)));
                    return Some(Ok(Frame::Close(reason)));
                }
                Message::Ping(payload) => {
                    trace!("websocket ping");
                    let _ = self.stream.send(Message::Pong(payload)).await;
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            debug!("websocket close failed: {e}");
        }
    }
}
