use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nicheradar_core::{Error, ErrorKind};
use tracing::error;

/// Maps pipeline errors onto HTTP responses.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Malformed => StatusCode::BAD_REQUEST,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Budget => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Integrity | ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({
            "error": {
                "kind": self.0.kind,
                "message": self.0.message,
            }
        }));
        (status, body).into_response()
    }
}
