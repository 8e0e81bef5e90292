//! Per-route query validation and shaping.
//!
//! Each route turns its raw query string into a [`CallPlan`]: what to send
//! upstream, what to record, and under which location. Nothing here does
//! I/O, so every rejection happens before the provider is contacted.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;
use wxproxy_core::ValidationError;
use wxproxy_weather::{merge_params, ApiName, QueryParams};

pub type RawQuery = HashMap<String, String>;

pub const MAX_FORECAST_DAYS: i64 = 10;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Everything a handler needs to call upstream and record the result.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    pub api: ApiName,
    pub q: Option<String>,
    pub extra: QueryParams,
    /// Parameters written alongside the record
    pub persisted_params: Option<QueryParams>,
    pub location: Option<String>,
}

/// A query value, with empty strings treated as absent.
fn get<'a>(query: &'a RawQuery, name: &str) -> Option<&'a str> {
    query.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

fn require<'a>(query: &'a RawQuery, name: &str, message: &str) -> Result<&'a str, ValidationError> {
    get(query, name).ok_or_else(|| ValidationError::new(message))
}

fn require_q(query: &RawQuery) -> Result<&str, ValidationError> {
    require(query, "q", "missing 'q' query parameter")
}

pub fn validate_date(dt: &str) -> Result<(), ValidationError> {
    NaiveDate::parse_from_str(dt, DATE_FORMAT)
        .map(|_| ())
        .map_err(|_| ValidationError::new("dt must be in YYYY-MM-DD format"))
}

fn parse_int(query: &RawQuery, name: &str) -> Result<Option<i64>, ValidationError> {
    get(query, name)
        .map(|v| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| ValidationError::new(format!("{} must be an integer", name)))
        })
        .transpose()
}

/// Latitude or longitude, kept as the caller wrote it once it parses.
fn parse_coordinate<'a>(query: &'a RawQuery, name: &str) -> Result<Option<&'a str>, ValidationError> {
    match get(query, name) {
        Some(v) if v.trim().parse::<f64>().is_ok_and(f64::is_finite) => Ok(Some(v.trim())),
        Some(_) => Err(ValidationError::new(format!("{} must be a number", name))),
        None => Ok(None),
    }
}

fn optional_date(query: &RawQuery) -> Result<Option<&str>, ValidationError> {
    let dt = get(query, "dt");
    if let Some(dt) = dt {
        validate_date(dt)?;
    }
    Ok(dt)
}

fn single(name: &str, value: Value) -> QueryParams {
    QueryParams::from([(name.to_string(), value)])
}

fn text(s: &str) -> Value {
    Value::String(s.to_string())
}

/// `q`, or `"lat,lon"` when both coordinates are present.
fn q_or_coordinates(query: &RawQuery) -> Result<String, ValidationError> {
    let lat = parse_coordinate(query, "lat")?;
    let lon = parse_coordinate(query, "lon")?;
    match (get(query, "q"), lat, lon) {
        (Some(q), _, _) => Ok(q.to_string()),
        (None, Some(lat), Some(lon)) => Ok(format!("{},{}", lat, lon)),
        _ => Err(ValidationError::new("provide 'q' or both 'lat' and 'lon'")),
    }
}

/// Shape the query for one of the convenience routes.
pub fn plan_for(api: ApiName, query: &RawQuery) -> Result<CallPlan, ValidationError> {
    match api {
        ApiName::Current => {
            let location = require(query, "location", "missing 'location' query parameter")?;
            Ok(simple(api, location))
        }
        ApiName::Search => Ok(simple(api, require_q(query)?)),
        ApiName::Ip => Ok(simple(api, require(query, "ip", "missing 'ip' query parameter")?)),
        ApiName::Forecast => {
            let q = require_q(query)?;
            let days = parse_int(query, "days")?.unwrap_or(1);
            if !(1..=MAX_FORECAST_DAYS).contains(&days) {
                return Err(ValidationError::new(format!(
                    "days must be between 1 and {}",
                    MAX_FORECAST_DAYS
                )));
            }
            Ok(with_extra(api, q, single("days", Value::from(days))))
        }
        ApiName::History => {
            let q = require_q(query)?;
            let dt = require(query, "dt", "missing 'dt' (date) query parameter")?;
            validate_date(dt)?;
            Ok(with_extra(api, q, single("dt", text(dt))))
        }
        ApiName::Future => {
            let q = require_q(query)?;
            let extra = match parse_int(query, "days")? {
                Some(days) => single("days", Value::from(days)),
                None => QueryParams::new(),
            };
            let persisted = (!extra.is_empty()).then(|| extra.clone());
            Ok(CallPlan {
                api,
                q: Some(q.to_string()),
                extra,
                persisted_params: persisted,
                location: Some(q.to_string()),
            })
        }
        ApiName::Astronomy => {
            let q = require_q(query)?;
            let mut params = single("q", text(q));
            if let Some(dt) = optional_date(query)? {
                params.insert("dt".into(), text(dt));
            }
            Ok(params_only(api, params, q))
        }
        ApiName::Marine | ApiName::Timezone => {
            let q = q_or_coordinates(query)?;
            Ok(params_only(api, single("q", text(&q)), &q))
        }
    }
}

/// `q` only; recorded as `{q}`.
fn simple(api: ApiName, q: &str) -> CallPlan {
    CallPlan {
        api,
        q: Some(q.to_string()),
        extra: QueryParams::new(),
        persisted_params: Some(single("q", text(q))),
        location: Some(q.to_string()),
    }
}

/// `q` plus extra; recorded as the merge of both.
fn with_extra(api: ApiName, q: &str, extra: QueryParams) -> CallPlan {
    CallPlan {
        api,
        q: Some(q.to_string()),
        persisted_params: Some(merge_params(Some(q), &extra)),
        extra,
        location: Some(q.to_string()),
    }
}

/// Everything travels in `extra`; recorded as-is.
fn params_only(api: ApiName, params: QueryParams, location: &str) -> CallPlan {
    CallPlan {
        api,
        q: None,
        persisted_params: Some(params.clone()),
        extra: params,
        location: Some(location.to_string()),
    }
}

/// Shape the query for `/weather/api/{api_name}`.
///
/// `ip` and `lat`/`lon` both override `q`; coordinates win over `ip`. The
/// recorded location is the caller's own `q`, whatever was forwarded.
pub fn plan_generic(api_name: &str, query: &RawQuery) -> Result<CallPlan, ValidationError> {
    let api: ApiName = api_name.parse()?;
    let q = get(query, "q");

    let mut extra = QueryParams::new();
    if let Some(days) = parse_int(query, "days")? {
        extra.insert("days".into(), Value::from(days));
    }
    if let Some(dt) = optional_date(query)? {
        extra.insert("dt".into(), text(dt));
    }
    if let Some(ip) = get(query, "ip") {
        extra.insert("q".into(), text(ip));
    }
    if let (Some(lat), Some(lon)) = (parse_coordinate(query, "lat")?, parse_coordinate(query, "lon")?) {
        extra.insert("q".into(), Value::String(format!("{},{}", lat, lon)));
    }

    let persisted = if extra.is_empty() {
        single("q", q.map_or(Value::Null, text))
    } else {
        extra.clone()
    };
    Ok(CallPlan {
        api,
        q: q.map(str::to_string),
        extra,
        persisted_params: Some(persisted),
        location: q.map(str::to_string),
    })
}
