//! HTTP surface of wxproxy.
//!
//! Routes shape each request's query, dispatch it upstream, record the
//! outcome, and answer with a JSON envelope. Errors are rendered as
//! `{"detail": ...}` with a status from [`error_mapping`].

pub mod error_mapping;
pub mod handlers;
pub mod params;
pub mod routes;
pub mod state;

pub use error_mapping::ApiError;
pub use routes::routes;
pub use state::{AppState, SharedState};
