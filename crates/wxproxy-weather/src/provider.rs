//! HTTP client for the upstream weather provider.

use std::time::{Duration, Instant};

use reqwest::{Client, Response, Url};
use tracing::instrument;

use crate::cache::{cache_key, CacheProvider};
use crate::error::UpstreamError;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{
    normalize_endpoint, param_to_query_value, CacheEntry, CallMeta, CallResult, QueryParams,
};

/// Query parameter carrying the API key.
pub const API_KEY_PARAM: &str = "key";

/// Settings the client needs for every call.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub cache_ttl: Duration,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl From<&wxproxy_core::Settings> for UpstreamConfig {
    fn from(settings: &wxproxy_core::Settings) -> Self {
        Self {
            base_url: settings.weather_base_url.clone(),
            api_key: settings.weather_api_key.clone(),
            cache_ttl: settings.cache_ttl(),
        }
    }
}

/// Calls the provider with caching and retry.
///
/// Constructed once at start-up and shared; the HTTP client and cache are
/// both cheap to clone.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    config: UpstreamConfig,
    cache: CacheProvider,
    retry: RetryConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig, cache: CacheProvider) -> Self {
        Self {
            http: Client::new(),
            config,
            cache,
            retry: RetryConfig::default(),
        }
    }

    /// Replace the retry policy. Tests use this to shorten backoff.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &CacheProvider {
        &self.cache
    }

    /// Call `endpoint` with `params`, serving from cache when possible.
    ///
    /// `params` must not contain the API key; it is injected here.
    #[instrument(skip(self, params))]
    pub async fn invoke(
        &self,
        endpoint: &str,
        params: &QueryParams,
        timeout: Duration,
    ) -> Result<CallResult, UpstreamError> {
        let endpoint = normalize_endpoint(endpoint);
        let base_url = self
            .config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(UpstreamError::NotConfigured("WEATHER_BASE_URL"))?;
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(UpstreamError::NotConfigured("WEATHER_API_KEY"))?;
        let url = Url::parse(&format!("{}/{}", base_url.trim_end_matches('/'), endpoint))
            .map_err(|_| UpstreamError::NotConfigured("WEATHER_BASE_URL"))?;

        let key = cache_key(&endpoint, params);
        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                tracing::debug!(cache_key = %key, "Cache hit");
                return Ok(entry.into());
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache read failed, treating as miss: {}", e),
        }

        let mut query: Vec<(String, String)> = Vec::with_capacity(params.len() + 1);
        query.push((API_KEY_PARAM.to_string(), api_key.to_string()));
        query.extend(
            params
                .iter()
                .filter_map(|(k, v)| param_to_query_value(v).map(|v| (k.clone(), v))),
        );

        let started = Instant::now();
        let response = with_retry(&self.retry, || {
            self.http.get(url.clone()).query(&query).timeout(timeout).send()
        })
        .await
        .map_err(|e| UpstreamError::Transport(e.without_url().to_string()))?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = Self::handle_response(response, duration_ms).await?;
        tracing::info!(
            status = result.meta.status_code,
            duration_ms = result.meta.duration_ms,
            "Upstream call succeeded"
        );

        if let Err(e) = self
            .cache
            .set(&key, &CacheEntry::from(&result), self.config.cache_ttl)
            .await
        {
            tracing::warn!("Cache write failed: {}", e);
        }

        Ok(result)
    }

    async fn handle_response(response: Response, duration_ms: u64) -> Result<CallResult, UpstreamError> {
        let status = response.status();
        let request_url = redact_api_key(response.url());
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            let message = provider_error_message(&body).unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            });
            tracing::warn!(status = status.as_u16(), "Upstream call failed: {}", message);
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let payload: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| UpstreamError::InvalidBody(e.to_string()))?;

        Ok(CallResult {
            payload,
            meta: CallMeta {
                status_code: status.as_u16(),
                duration_ms,
                request_url,
            },
        })
    }
}

/// The provider reports failures as `{"error": {"code": .., "message": ..}}`.
fn provider_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// Render `url` without its `key` query pair.
pub fn redact_api_key(url: &Url) -> String {
    let mut redacted = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| *k != API_KEY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        redacted.set_query(None);
    } else {
        redacted.query_pairs_mut().clear().extend_pairs(kept);
    }
    redacted.to_string()
}
