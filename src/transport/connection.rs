//! Connection lifecycle with fixed-delay reconnect.
//!
//! `Lifecycle` is the pure state machine: it decides what to do next and
//! never sleeps or touches a socket. `Connection` owns the one driver task
//! that carries those decisions out. Only the driver opens, closes, or
//! replaces the live socket.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::socket::{Connector, Duplex, Frame};
use super::DEFAULT_RECONNECT_DELAY;
use crate::bus::EventBus;

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// How long to wait before reconnecting. Retries never stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Fixed(Duration),
}

impl ReconnectPolicy {
    pub fn delay_for(&self, _attempt: u32) -> Duration {
        match self {
            ReconnectPolicy::Fixed(delay) => *delay,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    OpenSocket,
    ScheduleReconnect(Duration),
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl Lifecycle {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Closed,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive drops or failed attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start connecting unless a socket is already open or opening.
    pub fn connect(&mut self) -> Option<LifecycleAction> {
        match self.state {
            ConnectionState::Open | ConnectionState::Connecting => None,
            ConnectionState::Closed => {
                self.state = ConnectionState::Connecting;
                Some(LifecycleAction::OpenSocket)
            }
        }
    }

    pub fn on_open(&mut self) {
        self.state = ConnectionState::Open;
        self.attempts = 0;
    }

    /// The socket closed (or failed to open). Returns the reconnect to
    /// schedule, or `None` if this drop was already accounted for.
    pub fn on_closed(&mut self) -> Option<LifecycleAction> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        self.state = ConnectionState::Closed;
        self.attempts = self.attempts.saturating_add(1);
        Some(LifecycleAction::ScheduleReconnect(
            self.policy.delay_for(self.attempts),
        ))
    }

    /// Errors always end in a close.
    pub fn on_error(&mut self) -> Option<LifecycleAction> {
        self.on_closed()
    }

    pub fn on_reconnect_due(&mut self) -> Option<LifecycleAction> {
        self.connect()
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Handle to the running connection. Dropping it stops the driver.
pub struct Connection {
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Spawn the driver and start connecting to `url` immediately. Every text
    /// frame received is handed to `bus`.
    pub fn start(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        bus: EventBus,
        policy: ReconnectPolicy,
    ) -> Self {
        let url = url.into();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(drive(url, connector, bus, policy, state_tx, shutdown_rx));

        Self {
            state_rx,
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver for a connectivity indicator.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stop the driver and close the socket, waiting for both.
    pub async fn dispose(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

enum Step {
    Next(Option<LifecycleAction>),
    Shutdown,
}

async fn drive(
    url: String,
    connector: Arc<dyn Connector>,
    bus: EventBus,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut lifecycle = Lifecycle::new(policy);
    let mut next = lifecycle.connect();

    loop {
        state_tx.send_replace(lifecycle.state());

        let step = match next.take() {
            Some(LifecycleAction::OpenSocket) => {
                let connected = tokio::select! {
                    _ = &mut shutdown_rx => None,
                    result = connector.connect(&url) => Some(result),
                };
                match connected {
                    None => Step::Shutdown,
                    Some(Ok(socket)) => {
                        lifecycle.on_open();
                        state_tx.send_replace(lifecycle.state());
                        info!("push connection open at {url}");
                        run_socket(socket, &bus, &mut shutdown_rx, &mut lifecycle).await
                    }
                    Some(Err(e)) => {
                        warn!("push connection to {url} failed: {e}");
                        Step::Next(lifecycle.on_error())
                    }
                }
            }
            Some(LifecycleAction::ScheduleReconnect(delay)) => {
                info!(
                    "reconnecting in {:?} (attempt {})",
                    delay,
                    lifecycle.attempts()
                );
                tokio::select! {
                    _ = &mut shutdown_rx => Step::Shutdown,
                    _ = sleep(delay) => Step::Next(lifecycle.on_reconnect_due()),
                }
            }
            None => {
                let _ = (&mut shutdown_rx).await;
                Step::Shutdown
            }
        };

        match step {
            Step::Next(action) => next = action,
            Step::Shutdown => break,
        }
    }

    lifecycle.on_closed();
    state_tx.send_replace(lifecycle.state());
    debug!("push connection driver stopped");
}

async fn run_socket(
    mut socket: Box<dyn Duplex>,
    bus: &EventBus,
    shutdown_rx: &mut oneshot::Receiver<()>,
    lifecycle: &mut Lifecycle,
) -> Step {
    let outcome = tokio::select! {
        _ = &mut *shutdown_rx => None,
        reason = pump(socket.as_mut(), bus) => Some(reason),
    };
    socket.close().await;

    match outcome {
        None => Step::Shutdown,
        Some(reason) => {
            warn!("push connection closed: {reason}");
            Step::Next(lifecycle.on_closed())
        }
    }
}

/// Feed frames to the bus until the socket ends. Returns why it ended.
async fn pump(socket: &mut dyn Duplex, bus: &EventBus) -> String {
    loop {
        match socket.next_frame().await {
            Some(Ok(Frame::Text(text))) => {
                bus.dispatch_frame(&text);
            }
            Some(Ok(Frame::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => {
                    bus.dispatch_frame(&text);
                }
                Err(_) => warn!("dropping non-utf8 binary frame"),
            },
            Some(Ok(Frame::Close(reason))) => {
                return reason.unwrap_or_else(|| "server closed connection".to_string())
            }
            Some(Err(e)) => return format!("transport error: {e}"),
            None => return "stream ended".to_string(),
        }
    }
}
