use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_core::RelayError;
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Relay timed out after {0} seconds")]
    Timeout(u64),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Relay(RelayError::Transport(_)) | ApiError::Relay(RelayError::Decode(_)) => {
                tracing::error!("Upstream error: {}", self);
                StatusCode::BAD_GATEWAY
            }
            ApiError::Relay(_) => {
                tracing::error!("Internal error: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Relay(RelayError::Transport("reset".into())), StatusCode::BAD_GATEWAY),
            (ApiError::Relay(RelayError::Decode("bad".into())), StatusCode::BAD_GATEWAY),
            (ApiError::Relay(RelayError::Task("panic".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Timeout(120), StatusCode::GATEWAY_TIMEOUT),
            (ApiError::NotFound("speech".into()), StatusCode::NOT_FOUND),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
