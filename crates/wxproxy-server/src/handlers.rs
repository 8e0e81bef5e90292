//! Request handlers. Each one renders its own response, errors included.

use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;
use wxproxy_core::ValidationError;
use wxproxy_store::{InsertVariant, PersistedCallRecord, PoolInfo};
use wxproxy_weather::{ApiName, CallResult};

use crate::error_mapping::ApiError;
use crate::params::{plan_for, plan_generic, CallPlan, RawQuery};
use crate::state::SharedState;

#[derive(Debug, Serialize)]
struct SuccessBody<'a> {
    status: &'static str,
    api: &'static str,
    data: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    db_saved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    db_error: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    db_pool: PoolInfo,
    db_connected: bool,
}

fn render(outcome: Result<Response, ApiError>) -> Response {
    outcome.unwrap_or_else(ApiError::into_response)
}

pub async fn health(state: SharedState) -> Response {
    let db = state.database();
    let db_connected = db.is_configured() && db.ping().await.is_ok();
    warp::reply::json(&HealthBody {
        status: "ok",
        db_pool: db.pool_info(),
        db_connected,
    })
    .into_response()
}

pub async fn hello() -> Response {
    warp::reply::json(&serde_json::json!({"msg": "Hello from Weather backend"})).into_response()
}

pub async fn test_connection(state: SharedState) -> Response {
    match state.database().ping().await {
        Ok(()) => warp::reply::json(&serde_json::json!({"ok": true})).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Database connectivity check failed: {}", e.user_message());
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Database connectivity error")
                .into_response()
        }
    }
}

/// One of the fixed `/weather/<name>` routes.
pub async fn weather(api: ApiName, query: RawQuery, state: SharedState) -> Response {
    render(call(plan_for(api, &query), &state, false).await)
}

/// `/weather/api/{api_name}`. Reports persistence failures in the body.
pub async fn generic(api_name: String, query: RawQuery, state: SharedState) -> Response {
    render(call(plan_generic(&api_name, &query), &state, true).await)
}

async fn call(
    plan: Result<CallPlan, ValidationError>,
    state: &SharedState,
    report_persistence: bool,
) -> Result<Response, ApiError> {
    let plan = plan?;
    let result = state
        .dispatcher
        .dispatch(plan.api.as_str(), plan.q.as_deref(), &plan.extra)
        .await?;

    let saved = persist(state, &plan, &result).await;

    let db_error = if report_persistence { saved.err() } else { None };
    let body = SuccessBody {
        status: "success",
        api: plan.api.as_str(),
        data: &result.payload,
        db_saved: db_error.as_ref().map(|_| false),
        db_error,
    };
    Ok(warp::reply::json(&body).into_response())
}

/// Record the call on its own task so a dropped client connection does not
/// cancel the write.
async fn persist(state: &SharedState, plan: &CallPlan, result: &CallResult) -> Result<InsertVariant, String> {
    let record = PersistedCallRecord::from_call(
        plan.api,
        plan.location.as_deref(),
        plan.persisted_params.clone(),
        result,
    );
    let store = state.store.clone();

    match tokio::spawn(async move { store.persist(record).await }).await {
        Ok(outcome) => outcome.map_err(|e| e.to_string()),
        Err(e) => {
            tracing::error!("Persistence task failed: {}", e);
            Err(format!("persistence task failed: {}", e))
        }
    }
}
