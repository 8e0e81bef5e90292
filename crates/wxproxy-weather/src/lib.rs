//! Upstream weather provider access for wxproxy.
//!
//! Dispatches a fixed set of API names to the provider, with an optional
//! response cache and a retry policy for transient failures.

pub mod cache;
pub mod dispatch;
pub mod error;
pub mod provider;
pub mod retry;
pub mod types;

pub use cache::CacheProvider;
pub use dispatch::{merge_params, Dispatcher};
pub use error::{CacheError, DispatchError, UpstreamError};
pub use provider::{UpstreamClient, UpstreamConfig};
pub use retry::RetryConfig;
pub use types::*;
