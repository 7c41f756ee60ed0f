use axum::{extract::FromRef, http::StatusCode};
use tracing::{info, warn};

use super::{
    dto::{LoginRequest, SignupRequest},
    jwt::JwtKeys,
    password::verify_password,
};
use crate::{
    error::AppError,
    state::AppState,
    users::model::{normalize_email, validate_signup, NewUser, User},
};

/// Validates the payload, rejects taken emails, stores the user with a hashed
/// password and issues a token for it.
pub async fn signup(state: &AppState, payload: SignupRequest) -> Result<(String, User), AppError> {
    let valid = validate_signup(&payload)?;

    if state.users.find_by_email(&valid.email).await?.is_some() {
        warn!(email = %valid.email, "email already registered");
        return Err(AppError::new(
            "Email already in use, please use another email",
            StatusCode::BAD_REQUEST,
        ));
    }

    let user = state.users.create(NewUser::new(valid)?).await?;
    let token = JwtKeys::from_ref(state).sign(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((token, user))
}

pub async fn login(state: &AppState, payload: LoginRequest) -> Result<(String, User), AppError> {
    let (Some(email), Some(password)) = (
        payload.email.as_deref().map(normalize_email).filter(|e| !e.is_empty()),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::new(
            "Please provide email and password!",
            StatusCode::BAD_REQUEST,
        ));
    };

    let invalid = || AppError::new("Incorrect email or password", StatusCode::UNAUTHORIZED);

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(invalid());
    };

    if !verify_password(&password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    let token = JwtKeys::from_ref(state).sign(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok((token, user))
}
