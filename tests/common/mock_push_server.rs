//! In-process stand-in for the dashboard's push socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use donordesk_lib::transport::{Connector, Duplex, Frame, TransportError};

/// A connector whose sockets are fed by the test.
///
/// Only the most recent connection receives pushed frames. Dropping the
/// connection ends its stream, which the driver sees as a server close.
#[derive(Clone, Default)]
pub struct MockPushServer {
    live: Arc<Mutex<Option<mpsc::UnboundedSender<Frame>>>>,
    connects: Arc<AtomicUsize>,
}

impl MockPushServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful connects so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Push a raw text frame. Returns false when no socket is open.
    pub async fn push_text(&self, text: impl Into<String>) -> bool {
        match self.live.lock().await.as_ref() {
            Some(tx) => tx.send(Frame::Text(text.into())).is_ok(),
            None => false,
        }
    }

    /// Push a `{type, data}` envelope.
    pub async fn push(&self, event_type: &str, data: serde_json::Value) -> bool {
        let envelope = serde_json::json!({ "type": event_type, "data": data });
        self.push_text(envelope.to_string()).await
    }

    /// Close the current socket from the server side.
    pub async fn drop_connection(&self) {
        self.live.lock().await.take();
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

struct MockSocket {
    frames: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Duplex for MockSocket {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.frames.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.frames.close();
    }
}

#[async_trait]
impl Connector for MockPushServer {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Duplex>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.live.lock().await = Some(tx);
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSocket { frames: rx }))
    }
}
