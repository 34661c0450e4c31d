//! Handler error type: contract violations fail the request as HTTP 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use servertiming_core::TimingsError;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct AppError(#[from] pub TimingsError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.0.code().as_str();
        tracing::error!(code, error = %self.0, "request failed");
        let body = json!({
            "code": code,
            "msg": self.0.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
