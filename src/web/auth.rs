use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::config::{Config, Permission};

use super::api::error::ErrorResponse;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub adapter: Arc<Adapter>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub name: String,
    pub permissions: HashSet<Permission>,
}

impl AuthenticatedUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), PermissionError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            log::warn!("{} lacks {:?} permission", self.name, permission);
            Err(PermissionError(permission))
        }
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidFormat,
    InvalidKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = match self {
            AuthError::MissingAuth => "missing_authorization",
            AuthError::InvalidFormat => "invalid_authorization_format",
            AuthError::InvalidKey => "invalid_api_key",
        };
        (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(code))).into_response()
    }
}

#[derive(Debug)]
pub struct PermissionError(pub Permission);

impl IntoResponse for PermissionError {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::with_message(
                "insufficient_permissions",
                &format!("requires {:?}", self.0),
            )),
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("Authorization")
            .ok_or(AuthError::MissingAuth)?
            .to_str()
            .map_err(|_| AuthError::InvalidFormat)?;

        let key = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat)?;

        let api_key = state
            .config
            .find_api_key(key)
            .ok_or(AuthError::InvalidKey)?;

        Ok(AuthenticatedUser {
            name: api_key.name.clone(),
            permissions: api_key.permissions.clone(),
        })
    }
}
