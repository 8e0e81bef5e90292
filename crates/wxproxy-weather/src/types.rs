use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wxproxy_core::ValidationError;

/// Suffix the provider expects on every endpoint path.
pub const ENDPOINT_SUFFIX: &str = ".json";

/// Loosely-typed query parameters, kept sorted by key.
///
/// Values are JSON scalars (strings, numbers, booleans). Sorting makes the
/// serialized form canonical, which the cache key relies on.
pub type QueryParams = BTreeMap<String, serde_json::Value>;

/// The fixed set of provider APIs this service proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiName {
    Current,
    Forecast,
    Future,
    History,
    Marine,
    Search,
    Ip,
    Timezone,
    Astronomy,
}

impl ApiName {
    pub const ALL: [ApiName; 9] = [
        ApiName::Current,
        ApiName::Forecast,
        ApiName::Future,
        ApiName::History,
        ApiName::Marine,
        ApiName::Search,
        ApiName::Ip,
        ApiName::Timezone,
        ApiName::Astronomy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Forecast => "forecast",
            Self::Future => "future",
            Self::History => "history",
            Self::Marine => "marine",
            Self::Search => "search",
            Self::Ip => "ip",
            Self::Timezone => "timezone",
            Self::Astronomy => "astronomy",
        }
    }
}

impl fmt::Display for ApiName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiName {
    type Err = ValidationError;

    /// Case-sensitive: `"Current"` is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|api| api.as_str() == s)
            .ok_or_else(|| ValidationError::new(format!("Invalid api_name: {}", s)))
    }
}

/// Append the provider's `.json` suffix unless it is already there.
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.ends_with(ENDPOINT_SUFFIX) {
        endpoint.to_string()
    } else {
        format!("{}{}", endpoint, ENDPOINT_SUFFIX)
    }
}

/// Metadata captured for a successful upstream call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMeta {
    pub status_code: u16,
    pub duration_ms: u64,
    /// Final response URL with the API key removed
    pub request_url: String,
}

/// Payload and metadata of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub payload: serde_json::Value,
    pub meta: CallMeta,
}

/// Cached form of a call result, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    pub meta: CallMeta,
}

impl From<CacheEntry> for CallResult {
    fn from(entry: CacheEntry) -> Self {
        Self {
            payload: entry.data,
            meta: entry.meta,
        }
    }
}

impl From<&CallResult> for CacheEntry {
    fn from(result: &CallResult) -> Self {
        Self {
            data: result.payload.clone(),
            meta: result.meta.clone(),
        }
    }
}

/// Render a parameter value the way it goes on the wire.
///
/// Strings are sent unquoted; nulls are dropped.
pub fn param_to_query_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
