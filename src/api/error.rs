use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::error::MailError;

/// JSON error body returned by every API route.
#[derive(Debug)]
pub struct ApiError(pub MailError);

impl ApiError {
    fn code(&self) -> &str {
        match self.0 {
            MailError::NotFound(_) => "NotFound",
            MailError::BackendUnavailable(_) => "BackendUnavailable",
            MailError::Validation(_) => "ValidationFailure",
            MailError::Unknown(_) => "Unknown",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.0 {
            MailError::NotFound(_) => StatusCode::NOT_FOUND,
            MailError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MailError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MailError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = uuid::Uuid::new_v4();
        if status.is_server_error() {
            tracing::error!("Request {} failed: {}", request_id, self.0);
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.0.to_string(),
                "requestId": request_id,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        ApiError(err)
    }
}
