use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error};

use crate::error::GorillionaireError;

/// Handler error rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<GorillionaireError> for ApiError {
    fn from(err: GorillionaireError) -> Self {
        let status = match &err {
            GorillionaireError::Validation(_)
            | GorillionaireError::InvalidAddress(_)
            | GorillionaireError::OAuthState(_) => StatusCode::BAD_REQUEST,
            GorillionaireError::Auth(_) => StatusCode::UNAUTHORIZED,
            GorillionaireError::NotFound(_) => StatusCode::NOT_FOUND,
            GorillionaireError::Conflict(_) => StatusCode::CONFLICT,
            GorillionaireError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            GorillionaireError::Upstream { .. } | GorillionaireError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            GorillionaireError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed ({}): {}", status, err);
        } else {
            debug!("Request rejected ({}): {}", status, err);
        }

        // Internal details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal server error".to_string()
        } else {
            err.to_string()
        };

        Self { status, message }
    }
}

// Malformed bodies, path segments and query strings are all caller errors
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!("Rejected path: {}", rejection.body_text());
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        debug!("Rejected query: {}", rejection.body_text());
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
