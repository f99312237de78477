use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use super::blocking;
use crate::config::Permission;
use crate::geometry::SkyPosition;
use crate::platform::{PlatformAction, PlatformStatus};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{AppState, AuthenticatedUser};

#[derive(Debug, Deserialize, ToSchema)]
pub struct StrokeRequest {
    pub stroke_degrees: f64,
}

/// Either an equatorial or a horizontal position to sync to.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum SyncRequest {
    Equatorial { ra_hours: f64, dec_deg: f64 },
    Horizontal { azimuth_deg: f64, altitude_deg: f64 },
}

#[utoipa::path(
    get,
    path = "/api/platform/status",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Platform status", body = PlatformStatus),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "platform"
)]
pub async fn status(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> ApiResult<Json<PlatformStatus>> {
    let status = blocking(&state, |adapter| Ok(adapter.status())).await?;
    Ok(Json(status))
}

#[utoipa::path(
    get,
    path = "/api/platform/position",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Position reported to guiding clients", body = SkyPosition),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 502, description = "Mount unavailable", body = ErrorResponse)
    ),
    tag = "platform"
)]
pub async fn position(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> ApiResult<Json<SkyPosition>> {
    let position = blocking(&state, |adapter| adapter.virtual_position()).await?;
    Ok(Json(position))
}

async fn transition(
    state: AppState,
    user: AuthenticatedUser,
    action: PlatformAction,
) -> ApiResult<Json<PlatformStatus>> {
    user.require(Permission::Control)?;
    log::info!("{} requested {}", user.name, action);
    let status = blocking(&state, move |adapter| adapter.transition(action)).await?;
    Ok(Json(status))
}

#[utoipa::path(
    post,
    path = "/api/platform/start",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Platform tracking", body = PlatformStatus),
        (status = 409, description = "Not at start", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "platform"
)]
pub async fn start(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<PlatformStatus>> {
    transition(state, user, PlatformAction::Start).await
}

#[utoipa::path(
    post,
    path = "/api/platform/pause",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Platform stopped", body = PlatformStatus),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "platform"
)]
pub async fn pause(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<PlatformStatus>> {
    transition(state, user, PlatformAction::Pause).await
}

#[utoipa::path(
    post,
    path = "/api/platform/resume",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Platform tracking", body = PlatformStatus),
        (status = 409, description = "Not stopped", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "platform"
)]
pub async fn resume(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<PlatformStatus>> {
    transition(state, user, PlatformAction::Resume).await
}

#[utoipa::path(
    post,
    path = "/api/platform/reset",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Platform back at start", body = PlatformStatus),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "platform"
)]
pub async fn reset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<PlatformStatus>> {
    transition(state, user, PlatformAction::Reset).await
}

#[utoipa::path(
    put,
    path = "/api/platform/stroke",
    request_body = StrokeRequest,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Stroke changed", body = PlatformStatus),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Platform not at start", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "platform"
)]
pub async fn set_stroke(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<StrokeRequest>,
) -> ApiResult<Json<PlatformStatus>> {
    user.require(Permission::Configure)?;
    if !request.stroke_degrees.is_finite() || request.stroke_degrees <= 0.0 {
        return Err(ApiError::Validation(
            "stroke_degrees must be positive".to_string(),
        ));
    }

    let status = blocking(&state, move |adapter| {
        adapter.set_stroke_degrees(request.stroke_degrees)
    })
    .await?;
    Ok(Json(status))
}

#[utoipa::path(
    post,
    path = "/api/platform/sync",
    request_body = SyncRequest,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Synced", body = SkyPosition),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "platform"
)]
pub async fn sync(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<SkyPosition>> {
    user.require(Permission::Guide)?;
    validate_sync(&request)?;

    let position = blocking(&state, move |adapter| {
        match request {
            SyncRequest::Equatorial { ra_hours, dec_deg } => {
                adapter.sync_to_coordinates(ra_hours, dec_deg)?
            }
            SyncRequest::Horizontal {
                azimuth_deg,
                altitude_deg,
            } => adapter.sync_to_alt_az(azimuth_deg, altitude_deg)?,
        }
        adapter.virtual_position()
    })
    .await?;
    Ok(Json(position))
}

fn validate_sync(request: &SyncRequest) -> ApiResult<()> {
    let (ok, what) = match *request {
        SyncRequest::Equatorial { ra_hours, dec_deg } => (
            (0.0..24.0).contains(&ra_hours) && (-90.0..=90.0).contains(&dec_deg),
            "ra_hours must be in [0, 24) and dec_deg in [-90, 90]",
        ),
        SyncRequest::Horizontal {
            azimuth_deg,
            altitude_deg,
        } => (
            azimuth_deg.is_finite() && (-90.0..=90.0).contains(&altitude_deg),
            "altitude_deg must be in [-90, 90]",
        ),
    };
    if ok {
        Ok(())
    } else {
        Err(ApiError::Validation(what.to_string()))
    }
}
