use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    handlers::cookies::ACCESS_COOKIE,
    models::session::AuthUser,
    services::tokens,
    state::AppState,
};

/// Reads the access token from its cookie, falling back to a bearer header.
fn extract_access_token(cookies: &Cookies, request: &Request<Body>) -> Option<String> {
    if let Some(cookie) = cookies.get(ACCESS_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Requires a live access token on an open session of an account allowed to act.
///
/// Inserts [`AuthUser`] and the loaded `User` into the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    tracing::debug!("🔐 Checking authentication...");

    let token = extract_access_token(&cookies, &request).ok_or_else(|| {
        tracing::debug!("❌ No access token presented");
        AppError::MissingToken
    })?;

    let (auth, user) = tokens::authenticate(&state.db, &token, Utc::now()).await?;
    tracing::debug!("✅ User authenticated: {}", auth.user_id);

    request.extensions_mut().insert(auth);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Must run after [`require_auth`].
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response> {
    let is_admin = request
        .extensions()
        .get::<AuthUser>()
        .map(|auth| auth.is_admin)
        .ok_or(AppError::MissingToken)?;

    if !is_admin {
        return Err(AppError::Forbidden("Admin privileges required".to_string()));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware::from_fn, routing::get, Router};
    use tower::ServiceExt;

    fn admin_router(identity: Option<AuthUser>) -> Router {
        Router::new()
            .route("/admin", get(|| async { "ok" }))
            .route_layer(from_fn(require_admin))
            .layer(from_fn(move |mut request: Request<Body>, next: Next| {
                let identity = identity.clone();
                async move {
                    if let Some(auth) = identity {
                        request.extensions_mut().insert(auth);
                    }
                    next.run(request).await
                }
            }))
    }

    async fn status_for(identity: Option<AuthUser>) -> StatusCode {
        admin_router(identity)
            .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn admins_pass() {
        let auth = AuthUser { user_id: 1, session_id: 1, is_admin: true };
        assert_eq!(status_for(Some(auth)).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn regular_users_are_forbidden() {
        let auth = AuthUser { user_id: 2, session_id: 5, is_admin: false };
        assert_eq!(status_for(Some(auth)).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn anonymous_requests_are_sent_to_login() {
        assert_eq!(status_for(None).await, StatusCode::FORBIDDEN);
    }
}
