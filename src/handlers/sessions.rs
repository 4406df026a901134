use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_cookies::Cookies;

use crate::{
    error::Result,
    handlers::cookies::{clear_token_cookies, set_token_cookies, REFRESH_COOKIE},
    services::tokens,
    state::AppState,
};

#[derive(Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Rotates the `refresh_token` cookie into a new access/refresh pair.
///
/// A rejected token also clears both cookies so the client goes back to login.
pub async fn refresh(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    let presented = cookies.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    let pair = match tokens::refresh_session(
        &state.db,
        &state.config.tokens,
        presented.as_deref(),
        Utc::now(),
    )
    .await
    {
        Ok(pair) => pair,
        Err(e) => {
            if e.requires_login() {
                clear_token_cookies(&cookies);
            }
            return Err(e);
        }
    };

    set_token_cookies(&cookies, &pair, state.config.production);

    let response = RefreshResponse {
        success: true,
        access_expires_at: pair.access.expires_at,
        refresh_expires_at: pair.refresh.expires_at,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
