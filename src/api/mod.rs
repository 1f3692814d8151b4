//! REST collaborator.
//!
//! - `client`: `reqwest` client with base path and bearer auth
//! - `normalize`: the one place that knows list response shapes
//! - `source`: the `ListSource` seam the query controller fetches through

pub mod client;
pub mod error;
pub mod normalize;
pub mod source;

pub use client::ApiClient;
pub use error::ApiError;
pub use normalize::{normalize_list, Page, LIST_SHAPE_VERSION};
pub use source::{EndpointSource, ListParams, ListSource};
