//! Maps a logical API name plus caller parameters onto an upstream call.

use std::time::Duration;

use crate::error::DispatchError;
use crate::provider::UpstreamClient;
use crate::types::{ApiName, CallResult, QueryParams};

/// Build the parameters sent upstream: `{q}` when `q` is non-empty, then
/// every entry of `extra`, which wins on conflict.
pub fn merge_params(q: Option<&str>, extra: &QueryParams) -> QueryParams {
    let mut merged = QueryParams::new();
    if let Some(q) = q.filter(|q| !q.is_empty()) {
        merged.insert("q".to_string(), serde_json::Value::String(q.to_string()));
    }
    merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: UpstreamClient,
    default_timeout: Duration,
}

impl Dispatcher {
    pub fn new(client: UpstreamClient, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    /// Validate `api_name`, merge parameters, and call upstream with the
    /// configured timeout.
    pub async fn dispatch(
        &self,
        api_name: &str,
        q: Option<&str>,
        extra: &QueryParams,
    ) -> Result<CallResult, DispatchError> {
        self.dispatch_with_timeout(api_name, q, extra, self.default_timeout)
            .await
    }

    pub async fn dispatch_with_timeout(
        &self,
        api_name: &str,
        q: Option<&str>,
        extra: &QueryParams,
        timeout: Duration,
    ) -> Result<CallResult, DispatchError> {
        let api: ApiName = api_name.parse()?;
        let params = merge_params(q, extra);
        tracing::debug!(api = %api, "Dispatching");
        Ok(self.client.invoke(api.as_str(), &params, timeout).await?)
    }
}
