use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{UpdateProfileRequest, UserListResponse, UserResponse},
    model::{ProfileUpdate, Role},
};
use crate::{auth::CurrentUser, error::AppError, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(get_me))
        .route("/users/:id", patch(update_user))
}

#[instrument(skip_all, fields(user_id = %user.0.id))]
pub async fn get_me(user: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::success(user.0))
}

#[instrument(skip_all, fields(user_id = %user.0.id))]
pub async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::invalid_id("id", &id))?;
    user.verify_user(id)?;

    let Json(payload) = payload?;
    if payload.password.is_some() || payload.confirm_password.is_some() {
        return Err(AppError::new(
            "This route is not for password updates.",
            StatusCode::BAD_REQUEST,
        ));
    }
    let update = ProfileUpdate::validate(payload.full_name.as_deref(), payload.company_name.as_deref())?;

    let updated = state.users.update_profile(id, update).await?.ok_or_else(|| {
        AppError::new("No user found with that ID", StatusCode::NOT_FOUND)
    })?;
    info!("profile updated");
    Ok(Json(UserResponse::success(updated)))
}

#[instrument(skip_all, fields(user_id = %user.0.id))]
pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<UserListResponse>, AppError> {
    user.restrict_to(&[Role::Admin])?;
    let users = state.users.list().await?;
    Ok(Json(UserListResponse::success(users)))
}
