//! Incremental list queries.
//!
//! - `slot`: per-slot generation counters that make stale responses inert
//! - `cursor`: offset pagination over the loaded items
//! - `controller`: `run_query` / `load_more` / `refresh` with cancellation
//! - `live`: push-event driven silent refresh of a controller

pub mod controller;
pub mod cursor;
pub mod live;
pub mod slot;


pub use controller::{ErrorNotice, QueryController, QueryOutcome, QueryState, RunOptions, StateOf};
pub use cursor::PageCursor;
pub use live::LiveQuery;
pub use slot::{RequestSlot, SlotToken};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("page size must be greater than zero (got {0})")]
    InvalidPageSize(usize),
}
