//! Maps service errors to HTTP status codes and the `{"detail": ...}` body.

use std::convert::Infallible;

use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};
use wxproxy_core::ValidationError;
use wxproxy_weather::{DispatchError, UpstreamError};

pub const INTERNAL_ERROR: &str = "Internal Server Error";

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

/// A failed request, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
    }

    pub fn into_response(self) -> Response {
        let body = warp::reply::json(&ErrorBody {
            detail: &self.detail,
        });
        warp::reply::with_status(body, self.status).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::bad_request(e.message())
    }
}

impl From<UpstreamError> for ApiError {
    fn from(e: UpstreamError) -> Self {
        if e.is_configuration() {
            tracing::error!("Upstream misconfigured: {}", e);
            return Self::internal();
        }
        tracing::error!("Upstream call failed: {}", e);
        Self::new(StatusCode::BAD_GATEWAY, e.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Validation(e) => e.into(),
            DispatchError::Upstream(e) => e.into(),
        }
    }
}

/// Render rejections that never reached a handler.
pub async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let error = if rejection.is_not_found() {
        ApiError::new(StatusCode::NOT_FOUND, "Not Found")
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        ApiError::bad_request(e.to_string())
    } else {
        tracing::error!("Unhandled rejection: {:?}", rejection);
        ApiError::internal()
    };
    Ok(error.into_response())
}
