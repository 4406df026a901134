use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use garde::Validate;
use serde::Deserialize;
use tower_cookies::Cookies;

use crate::{
    error::Result,
    handlers::cookies::clear_token_cookies,
    models::{
        session::AuthUser,
        user::{PublicUser, User},
    },
    services::{auth as auth_service, lifecycle},
    state::AppState,
};

#[derive(Deserialize, Validate)]
pub struct SettingsRequest {
    #[garde(skip)]
    pub holiday_mode: bool,
}

/// The authenticated user's own account.
pub async fn get_account(Extension(user): Extension<User>) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<SettingsRequest>,
) -> Result<Json<PublicUser>> {
    payload.validate()?;
    let user = auth_service::update_settings(&state.db, auth.user_id, payload.holiday_mode).await?;
    tracing::info!("⚙️ Holiday mode for user {} set to {}", user.id, user.holiday_mode);
    Ok(Json(PublicUser::from(&user)))
}

/// Schedules the account for deletion and logs out everywhere.
pub async fn request_deletion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    cookies: Cookies,
) -> Result<Response> {
    let lifecycle_state = lifecycle::request_deletion(
        &state.db,
        auth.user_id,
        state.config.deletion_grace_days,
        Utc::now(),
    )
    .await?;
    clear_token_cookies(&cookies);

    Ok((StatusCode::OK, Json(lifecycle_state)).into_response())
}

pub async fn cancel_deletion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Response> {
    let lifecycle_state = lifecycle::cancel_deletion(&state.db, auth.user_id).await?;
    Ok((StatusCode::OK, Json(lifecycle_state)).into_response())
}

pub async fn deactivate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    cookies: Cookies,
) -> Result<Response> {
    let lifecycle_state = lifecycle::deactivate(&state.db, auth.user_id, Utc::now()).await?;
    clear_token_cookies(&cookies);
    Ok((StatusCode::OK, Json(lifecycle_state)).into_response())
}
