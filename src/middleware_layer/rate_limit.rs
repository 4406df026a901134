use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::aio::ConnectionManager;
use sonic_rs::JsonValueTrait;
use std::net::SocketAddr;

use crate::{error::AppError, state::AppState};

/// Largest body the limiters will buffer to read an identifier.
const MAX_INSPECTED_BODY: usize = 64 * 1024;

/// A fixed-window attempt counter kept in Redis.
///
/// Counter failures are logged and let the request through.
#[derive(Debug, Clone, Copy)]
pub struct AttemptLimit {
    pub scope: &'static str,
    pub max_attempts: i64,
    pub window_secs: i64,
}

pub const REGISTER_LIMIT: AttemptLimit = AttemptLimit {
    scope: "register",
    max_attempts: 3,
    window_secs: 12 * 3600,
};

pub const LOGIN_LIMIT: AttemptLimit = AttemptLimit {
    scope: "login",
    max_attempts: 5,
    window_secs: 15 * 60,
};

pub const PASSWORD_RESET_LIMIT: AttemptLimit = AttemptLimit {
    scope: "password_reset",
    max_attempts: 3,
    window_secs: 3600,
};

impl AttemptLimit {
    pub fn key(&self, subject: &str) -> String {
        format!("rate_limit:{}:{}", self.scope, subject.to_lowercase())
    }

    /// Seconds left in the window when the subject is over the limit.
    async fn blocked_for(&self, redis: &mut ConnectionManager, key: &str) -> Option<i64> {
        let count: Option<i64> = redis::cmd("GET")
            .arg(key)
            .query_async(redis)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("⚠️ Rate limit lookup failed for {}: {}", key, e);
                None
            });

        match count {
            Some(attempts) if attempts >= self.max_attempts => {
                let ttl: Option<i64> = redis::cmd("TTL")
                    .arg(key)
                    .query_async(redis)
                    .await
                    .unwrap_or(None);
                Some(ttl.unwrap_or(self.window_secs).max(0))
            }
            _ => None,
        }
    }

    async fn hit(&self, redis: &mut ConnectionManager, key: &str) {
        let count: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(redis)
            .await
            .unwrap_or(0);

        if count == 1 {
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(self.window_secs)
                .query_async(redis)
                .await
                .unwrap_or(());
        }
    }

    async fn clear(&self, redis: &mut ConnectionManager, key: &str) {
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(redis)
            .await
            .unwrap_or(());
    }
}

/// Human readable wait, rounded up to the minute.
pub fn retry_message(action: &str, wait_secs: i64) -> String {
    let minutes = (wait_secs + 59) / 60;
    format!("Too many {} attempts. Try again in {} minutes", action, minutes.max(1))
}

fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn field_from_body(body: &Bytes, field: &str) -> Option<String> {
    sonic_rs::from_slice::<sonic_rs::Value>(body)
        .ok()
        .and_then(|json| json.get(field).and_then(|v| v.as_str()).map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
}

/// Buffers the body so an identifier can be read before the handler runs.
async fn split_body(req: Request<Body>) -> Result<(axum::http::request::Parts, Bytes), Response> {
    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, MAX_INSPECTED_BODY).await {
        Ok(bytes) => Ok((parts, bytes)),
        Err(_) => Err(AppError::Validation("Request body too large".to_string()).into_response()),
    }
}

/// Limits account creation per client IP. Every attempt counts.
pub async fn rate_limit_register(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_real_ip(&req);
    let key = REGISTER_LIMIT.key(&ip);
    let mut redis = state.redis.clone();

    if let Some(wait) = REGISTER_LIMIT.blocked_for(&mut redis, &key).await {
        return AppError::RateLimitExceeded(retry_message("registration", wait)).into_response();
    }

    REGISTER_LIMIT.hit(&mut redis, &key).await;
    next.run(req).await
}

/// Limits failed logins per username. A successful login resets the counter.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = match split_body(req).await {
        Ok(split) => split,
        Err(response) => return response,
    };

    let username = field_from_body(&body, "username").unwrap_or_else(|| "unknown".to_string());
    let key = LOGIN_LIMIT.key(&username);
    let mut redis = state.redis.clone();

    if let Some(wait) = LOGIN_LIMIT.blocked_for(&mut redis, &key).await {
        return AppError::RateLimitExceeded(retry_message("login", wait)).into_response();
    }

    let response = next.run(Request::from_parts(parts, Body::from(body))).await;

    if response.status().is_client_error() {
        LOGIN_LIMIT.hit(&mut redis, &key).await;
    } else if response.status().is_success() {
        LOGIN_LIMIT.clear(&mut redis, &key).await;
    }

    response
}

/// Limits password reset emails per address.
pub async fn rate_limit_password_reset(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = match split_body(req).await {
        Ok(split) => split,
        Err(response) => return response,
    };

    let email = field_from_body(&body, "email").unwrap_or_else(|| "unknown".to_string());
    let key = PASSWORD_RESET_LIMIT.key(&email);
    let mut redis = state.redis.clone();

    if let Some(wait) = PASSWORD_RESET_LIMIT.blocked_for(&mut redis, &key).await {
        return AppError::RateLimitExceeded(retry_message("password reset", wait)).into_response();
    }

    PASSWORD_RESET_LIMIT.hit(&mut redis, &key).await;
    next.run(Request::from_parts(parts, Body::from(body))).await
}
