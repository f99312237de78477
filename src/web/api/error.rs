use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::platform::PlatformError;
use crate::web::auth::PermissionError;

pub enum ApiError {
    Permission(PermissionError),
    Validation(String),
    Platform(PlatformError),
    Internal(String),
}

impl From<PermissionError> for ApiError {
    fn from(e: PermissionError) -> Self {
        ApiError::Permission(e)
    }
}

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        ApiError::Platform(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Permission(e) => e.into_response(),
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_message("validation_failed", &msg)),
            )
                .into_response(),
            ApiError::Platform(e) => {
                let (status, code) = platform_status(&e);
                (
                    status,
                    Json(ErrorResponse::with_message(code, &e.to_string())),
                )
                    .into_response()
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_message("internal_error", &msg)),
            )
                .into_response(),
        }
    }
}

fn platform_status(e: &PlatformError) -> (StatusCode, &'static str) {
    match e {
        PlatformError::InvalidStateTransition { .. } => {
            (StatusCode::CONFLICT, "invalid_state_transition")
        }
        PlatformError::NotTracking => (StatusCode::CONFLICT, "not_tracking"),
        PlatformError::DispatchInFlight => (StatusCode::CONFLICT, "dispatch_in_flight"),
        PlatformError::StrokeLocked => (StatusCode::CONFLICT, "stroke_locked"),
        PlatformError::PulseTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "pulse_timeout"),
        PlatformError::Device(_) => (StatusCode::BAD_GATEWAY, "device_error"),
        PlatformError::ConfigurationMissing(_) => {
            (StatusCode::BAD_REQUEST, "configuration_missing")
        }
        PlatformError::Settings(_) => (StatusCode::INTERNAL_SERVER_ERROR, "settings_error"),
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: None,
        }
    }

    pub fn with_message(error: &str, message: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: Some(message.to_string()),
        }
    }
}
