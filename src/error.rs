use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    MissingType,
    NoProbes,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingType => (
                StatusCode::BAD_REQUEST,
                "Missing required parameter: type (java or bedrock)",
            ),
            ApiError::NoProbes => (StatusCode::SERVICE_UNAVAILABLE, "No probe nodes available"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = json!({ "error": message });

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
