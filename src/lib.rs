//! Real-time synchronization layer for the donor management dashboard.
//!
//! This crate keeps dashboard views in step with the server. It handles:
//! - One persistent WebSocket connection with fixed-delay reconnect
//! - Fan-out of server push events to independently registered listeners
//! - Cancellable, paginated list queries against the REST API
//! - Silent refreshes triggered by push events
//!
//! # Architecture
//!
//! Leaves first:
//! - `transport`: duplex socket primitive and the connection lifecycle
//! - `bus`: event registry, envelope parsing, and the refresh debouncer
//! - `api`: REST client and list response normalization
//! - `query`: request slots, page cursor, query controller, live binding
//! - `session`: persisted bearer token and admin gating
//! - `config`: origin/endpoint settings loaded from the environment

pub mod api;
pub mod bus;
pub mod config;
pub mod models;
pub mod query;
pub mod session;
pub mod transport;

pub use api::{ApiClient, ApiError, EndpointSource, ListSource, Page};
pub use bus::{Debouncer, EventBus, EventEnvelope, Subscription};
pub use config::SyncConfig;
pub use query::{LiveQuery, QueryController, QueryOutcome, QueryState, RunOptions};
pub use session::SessionStore;
pub use transport::{Connection, ConnectionState, ReconnectPolicy, WebSocketConnector};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{0}")]
    Config(#[from] config::ConfigError),
    #[error("{0}")]
    Session(#[from] session::SessionError),
    #[error("{0}")]
    Api(#[from] api::ApiError),
    #[error("{0}")]
    Query(#[from] query::QueryError),
    #[error("{0}")]
    Bus(#[from] bus::BusError),
    #[error("{0}")]
    Transport(#[from] transport::TransportError),
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise crate logs at debug and everything
/// else at info. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(
                        "donordesk_lib=debug,donordesk_watch=debug,info",
                    )
                }),
        )
        .try_init();
}
