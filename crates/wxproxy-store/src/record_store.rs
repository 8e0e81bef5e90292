//! Append-only storage of upstream call records.
//!
//! Deployed tables come in three shapes: the full seven-column layout, one
//! without the upstream status and URL, and a minimal three-column one. An
//! insert tries each shape in order, every attempt in its own transaction,
//! and stops at the first that commits.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use wxproxy_core::RusqliteErrorExt;
use wxproxy_weather::{ApiName, CallResult, QueryParams};

use crate::db::Database;
use crate::error::PersistError;

/// Stored in place of a missing or blank location.
pub const UNKNOWN_LOCATION: &str = "N/A";

/// Column layouts an insert can target, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertVariant {
    Full,
    WithoutUpstreamMeta,
    Minimal,
}

impl InsertVariant {
    pub const ORDER: [InsertVariant; 3] = [
        InsertVariant::Full,
        InsertVariant::WithoutUpstreamMeta,
        InsertVariant::Minimal,
    ];

    fn sql(&self) -> &'static str {
        match self {
            Self::Full => {
                "INSERT INTO weather_api_response
                    (location, api_type, json_data, params_json, response_time_ms, status_code, request_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            }
            Self::WithoutUpstreamMeta => {
                "INSERT INTO weather_api_response
                    (location, api_type, json_data, params_json, response_time_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            }
            Self::Minimal => {
                "INSERT INTO weather_api_response (location, api_type, json_data)
                 VALUES (?1, ?2, ?3)"
            }
        }
    }

    fn column_count(&self) -> usize {
        match self {
            Self::Full => 7,
            Self::WithoutUpstreamMeta => 5,
            Self::Minimal => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::WithoutUpstreamMeta => "without_upstream_meta",
            Self::Minimal => "minimal",
        }
    }
}

/// One upstream call as it is written to the database.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedCallRecord {
    pub location: Option<String>,
    pub api_type: String,
    pub json_data: serde_json::Value,
    pub params: Option<QueryParams>,
    pub response_time_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub request_url: Option<String>,
}

impl PersistedCallRecord {
    /// Record a successful call, taking timing and URL from its metadata.
    pub fn from_call(
        api: ApiName,
        location: Option<&str>,
        params: Option<QueryParams>,
        result: &CallResult,
    ) -> Self {
        Self {
            location: location.map(str::to_string),
            api_type: api.as_str().to_string(),
            json_data: result.payload.clone(),
            params,
            response_time_ms: Some(result.meta.duration_ms),
            status_code: Some(result.meta.status_code),
            request_url: Some(result.meta.request_url.clone()),
        }
    }

    /// Bind values for the full layout, in column order.
    fn to_values(&self) -> Result<Vec<Value>, PersistError> {
        let json_data = serde_json::to_string(&self.json_data)?;
        let params = self
            .params
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(vec![
            Value::Text(normalize_location(self.location.as_deref())),
            Value::Text(self.api_type.clone()),
            Value::Text(json_data),
            params.map_or(Value::Null, Value::Text),
            self.response_time_ms
                .map_or(Value::Null, |ms| Value::Integer(ms.min(i64::MAX as u64) as i64)),
            self.status_code
                .map_or(Value::Null, |s| Value::Integer(i64::from(s))),
            self.request_url.clone().map_or(Value::Null, Value::Text),
        ])
    }
}

/// Blank and missing locations are stored as [`UNKNOWN_LOCATION`].
pub fn normalize_location(location: Option<&str>) -> String {
    match location.map(str::trim) {
        Some(loc) if !loc.is_empty() => loc.to_string(),
        _ => UNKNOWN_LOCATION.to_string(),
    }
}

fn try_insert(conn: &mut Connection, variant: InsertVariant, values: &[Value]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        variant.sql(),
        params_from_iter(&values[..variant.column_count()]),
    )?;
    tx.commit()
}

fn insert_with_fallback(conn: &mut Connection, values: &[Value]) -> Result<InsertVariant, PersistError> {
    let mut last_error = String::new();
    for variant in InsertVariant::ORDER {
        match try_insert(conn, variant, values) {
            Ok(()) => return Ok(variant),
            Err(e) => {
                let e = e.into_database_error();
                tracing::warn!(variant = variant.as_str(), "Insert failed, trying next layout: {}", e);
                last_error = e.to_string();
            }
        }
    }
    Err(PersistError::AllVariantsFailed(last_error))
}

/// Writes call records through the shared [`Database`] handle.
#[derive(Debug, Clone)]
pub struct CallRecordStore {
    db: Database,
}

impl CallRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Save `record`, returning the layout that accepted it.
    pub async fn persist(&self, record: PersistedCallRecord) -> Result<InsertVariant, PersistError> {
        let values = record.to_values()?;
        let api_type = record.api_type;

        let outcome = self
            .db
            .with_connection(move |conn| insert_with_fallback(conn, &values))
            .await;

        match &outcome {
            Ok(variant) => {
                tracing::info!(api = %api_type, variant = variant.as_str(), "Call record saved");
            }
            Err(e) => tracing::error!(api = %api_type, "Call record not saved: {}", e),
        }
        outcome
    }
}
