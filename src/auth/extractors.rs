use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
};
use tracing::warn;
use uuid::Uuid;

use super::{cookie::token_from_cookie, jwt::JwtKeys};
use crate::{
    error::AppError,
    state::AppState,
    users::model::{Role, User},
};

/// The authenticated caller. Extracting it is the `protect` guard: a valid
/// token for a user that still exists is required.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| token_from_cookie(&parts.headers))
            .ok_or_else(|| {
                AppError::new(
                    "You are not logged in! Please log in to get access.",
                    StatusCode::UNAUTHORIZED,
                )
            })?;

        let claims = JwtKeys::from_ref(state).verify(&token).map_err(|e| {
            warn!("invalid or expired token");
            e
        })?;

        let user = state.users.find_by_id(claims.id).await?.ok_or_else(|| {
            warn!(user_id = %claims.id, "token for missing user");
            AppError::new(
                "The user belonging to this token no longer exists.",
                StatusCode::UNAUTHORIZED,
            )
        })?;

        Ok(CurrentUser(user))
    }
}

impl CurrentUser {
    /// Rejects callers whose role is not in `roles`.
    pub fn restrict_to(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.0.role) {
            return Ok(());
        }
        warn!(user_id = %self.0.id, role = ?self.0.role, "permission denied");
        Err(AppError::new(
            "You do not have permission to perform this action",
            StatusCode::FORBIDDEN,
        ))
    }

    /// Rejects callers acting on a profile other than their own.
    pub fn verify_user(&self, id: Uuid) -> Result<(), AppError> {
        if self.0.id == id {
            return Ok(());
        }
        Err(AppError::new(
            "You can only update your own profile!",
            StatusCode::FORBIDDEN,
        ))
    }
}
