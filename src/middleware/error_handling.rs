use crate::error::AppError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub status: u16,
}

/// Map domain errors to HTTP responses
pub fn map_error(err: &AppError) -> (StatusCode, ErrorBody) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let error = match err {
        AppError::BadRequest(_) => "validation_error",
        AppError::Unauthorized => "authentication_error",
        AppError::Forbidden => "authorization_error",
        AppError::NotFound => "not_found",
        _ => "server_error",
    };
    // Internal details stay in the logs, not in the response body.
    let message = match err {
        AppError::Config(_) | AppError::StartServer(_) | AppError::Database(_) => {
            tracing::error!(error = %err, "request failed");
            "internal server error".to_string()
        }
        other => other.to_string(),
    };
    (
        status,
        ErrorBody {
            error,
            message,
            status: status.as_u16(),
        },
    )
}

pub fn into_response(err: AppError) -> impl IntoResponse {
    let (status, body) = map_error(&err);
    (status, Json(body))
}
