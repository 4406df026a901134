use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_cookies::Cookies;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::Result,
    handlers::cookies::{clear_token_cookies, set_token_cookies},
    models::{session::AuthUser, user::PublicUser},
    services::{auth as auth_service, tokens::{self, LogoutSummary}},
    state::AppState,
    validation::auth as rules,
};

/// The request payload for user registration.
#[derive(Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct RegisterRequest {
    #[garde(custom(rules::username))]
    pub username: String,
    #[garde(email, length(max = 254))]
    pub email: String,
    #[garde(custom(rules::password))]
    pub password: String,
}

/// The request payload for user login.
#[derive(Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct LoginRequest {
    #[garde(length(min = 1, max = 64))]
    pub username: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

/// The request payload for changing a user's password.
#[derive(Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct ChangePasswordRequest {
    #[garde(length(min = 1, max = 128))]
    pub old_password: String,
    #[garde(custom(rules::password))]
    pub new_password: String,
}

#[derive(Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[garde(email, length(max = 254))]
    pub email: String,
}

#[derive(Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct ResetPasswordRequest {
    #[garde(custom(rules::opaque_token))]
    pub token: String,
    #[garde(custom(rules::password))]
    pub new_password: String,
}

#[derive(Deserialize, Validate)]
pub struct ConfirmEmailQuery {
    #[garde(custom(rules::opaque_token))]
    pub token: String,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logout: Option<LogoutSummary>,
}

impl AuthResponse {
    fn message(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            user: None,
            logout: None,
        }
    }
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.chars().take(255).collect())
}

/// Handles user registration.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt: {}", payload.username);
    payload.validate()?;

    let user = auth_service::register(
        &state.db,
        &state.config,
        state.mailer.as_ref(),
        &payload.username,
        &payload.email,
        &payload.password,
        Utc::now(),
    )
    .await?;

    let response = AuthResponse {
        user: Some(PublicUser::from(&user)),
        ..AuthResponse::message("Registration successful. Check your email to confirm your address.")
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Handles user login.
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt: {}", payload.username);
    payload.validate()?;

    let ip = addr.ip().to_string();
    let device = user_agent(&headers);

    let (user, pair) = auth_service::login(
        &state.db,
        &state.config,
        &payload.username,
        &payload.password,
        Some(ip.as_str()),
        device.as_deref(),
        Utc::now(),
    )
    .await?;

    set_token_cookies(&cookies, &pair, state.config.production);
    tracing::info!("✅ User logged in: {}", user.id);

    let response = AuthResponse {
        user: Some(PublicUser::from(&user)),
        ..AuthResponse::message("Login successful")
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Ends the current session.
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", auth.user_id);

    let summary = tokens::logout(&state.db, auth.session_id, Utc::now()).await?;
    clear_token_cookies(&cookies);

    let response = AuthResponse {
        logout: Some(summary),
        ..AuthResponse::message("Logout successful")
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Ends every session of the current user.
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    cookies: Cookies,
) -> Result<Response> {
    let summary = tokens::global_logout(&state.db, auth.user_id, Utc::now()).await?;
    clear_token_cookies(&cookies);

    let response = AuthResponse {
        logout: Some(summary),
        ..AuthResponse::message("Logged out from all devices")
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles changing a user's password. Every session ends, this one included.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    cookies: Cookies,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response> {
    payload.validate()?;

    let summary = auth_service::change_password(
        &state.db,
        auth.user_id,
        &payload.old_password,
        &payload.new_password,
        Utc::now(),
    )
    .await?;
    clear_token_cookies(&cookies);

    let response = AuthResponse {
        logout: Some(summary),
        ..AuthResponse::message("Password changed successfully. Please log in again.")
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

pub async fn resend_confirmation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Response> {
    auth_service::resend_confirmation(
        &state.db,
        &state.config,
        state.mailer.as_ref(),
        auth.user_id,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::OK, Json(AuthResponse::message("Confirmation email sent"))).into_response())
}

pub async fn confirm_email(
    State(state): State<AppState>,
    Query(query): Query<ConfirmEmailQuery>,
) -> Result<Response> {
    query.validate().map_err(|_| crate::error::AppError::InvalidToken)?;
    auth_service::confirm_email(&state.db, &query.token, Utc::now()).await?;

    Ok((StatusCode::OK, Json(AuthResponse::message("Email confirmed"))).into_response())
}

/// Always answers 200 whether or not the address is known.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Response> {
    payload.validate()?;

    auth_service::request_password_reset(
        &state.db,
        &state.config,
        state.mailer.as_ref(),
        &payload.email,
        Utc::now(),
    )
    .await?;

    let response =
        AuthResponse::message("If an account exists for this address, a reset link has been sent");
    Ok((StatusCode::OK, Json(response)).into_response())
}

pub async fn reset_password(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Response> {
    payload.validate()?;

    let summary =
        auth_service::reset_password(&state.db, &payload.token, &payload.new_password, Utc::now())
            .await?;
    clear_token_cookies(&cookies);

    let response = AuthResponse {
        logout: Some(summary),
        ..AuthResponse::message("Password has been reset. Please log in.")
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_payload_is_validated() {
        let ok = RegisterRequest {
            username: "reader_1".into(),
            email: "reader@example.com".into(),
            password: "paperback42".into(),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            username: "r".into(),
            email: "not-an-email".into(),
            password: "short".into(),
        };
        let report = bad.validate().unwrap_err();
        assert_eq!(report.iter().count(), 3);
    }

    #[test]
    fn user_agent_is_truncated() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, "a".repeat(400).parse().unwrap());
        assert_eq!(user_agent(&headers).map(|ua| ua.len()), Some(255));
        assert_eq!(user_agent(&HeaderMap::new()), None);
    }
}
