use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use super::blocking;
use crate::config::Permission;
use crate::guide::{DispatchReport, GuideDirection};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{AppState, AuthenticatedUser};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PulseRequest {
    pub direction: GuideDirection,
    pub duration_ms: u32,
}

#[utoipa::path(
    post,
    path = "/api/guide/pulse",
    request_body = PulseRequest,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Pulses issued", body = DispatchReport),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Not tracking or pulse in flight", body = ErrorResponse),
        (status = 504, description = "Guide port did not finish", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "guide"
)]
pub async fn pulse(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<PulseRequest>,
) -> ApiResult<Json<DispatchReport>> {
    user.require(Permission::Guide)?;
    if request.duration_ms == 0 {
        return Err(ApiError::Validation(
            "duration_ms must be positive".to_string(),
        ));
    }

    let report = blocking(&state, move |adapter| {
        adapter.handle_guide_pulse(request.direction, request.duration_ms)
    })
    .await?;
    Ok(Json(report))
}
