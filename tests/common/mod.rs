//! Common test utilities for live sync integration tests.

pub mod mock_push_server;

pub use mock_push_server::MockPushServer;
