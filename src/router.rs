use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
    Router,
};
use anyhow::Context;
use http::{header, HeaderValue, Method};
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    handlers,
    middleware_layer::{auth, rate_limit},
    state::AppState,
};

/// Builds the full HTTP surface.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let origin: HeaderValue = state
        .config
        .cors_origin
        .parse()
        .with_context(|| format!("Invalid CORS_ORIGIN '{}'", state.config.cors_origin))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let protected_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(60)
            .use_headers()
            .finish()
            .context("Invalid governor configuration")?,
    );

    let register_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_register))
        .with_state(state.clone());

    let login_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_login))
        .with_state(state.clone());

    let password_reset_routes = Router::new()
        .route("/auth/password-reset", post(handlers::auth::request_password_reset))
        .route_layer(from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_password_reset,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/sessions/refresh", post(handlers::sessions::refresh))
        .route("/auth/confirm-email", get(handlers::auth::confirm_email))
        .route(
            "/auth/password-reset/confirm",
            post(handlers::auth::reset_password),
        )
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/auth/change-password", post(handlers::auth::change_password))
        .route(
            "/auth/email-confirmation",
            post(handlers::auth::resend_confirmation),
        )
        .route("/account", get(handlers::account::get_account))
        .route("/account/settings", patch(handlers::account::update_settings))
        .route(
            "/account/deletion",
            post(handlers::account::request_deletion).delete(handlers::account::cancel_deletion),
        )
        .route("/account/deactivate", post(handlers::account::deactivate))
        .layer(tower_governor::GovernorLayer::new(protected_governor_conf.clone()))
        .route_layer(from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/admin/users/scheduled_to_delete",
            get(handlers::admin::list_scheduled_deletions),
        )
        .route(
            "/admin/users/{user_id}",
            patch(handlers::admin::toggle_suspension),
        )
        .route("/admin/users/{user_id}", delete(handlers::admin::delete_user))
        .layer(tower_governor::GovernorLayer::new(protected_governor_conf))
        .route_layer(from_fn(auth::require_admin))
        .route_layer(from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state);

    Ok(Router::new()
        .merge(register_routes)
        .merge(login_routes)
        .merge(password_reset_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors))
}
