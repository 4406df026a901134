use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Where clients are sent when their credentials can no longer be used.
pub const LOGIN_REDIRECT: &str = "/login";

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error. Any open transaction has been rolled back.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// The connection pool could not hand out a client.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Wrong username or password.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No refresh credential was presented.
    #[error("Missing token")]
    MissingToken,

    /// The presented token is unknown, expired or invalidated.
    #[error("Invalid token")]
    InvalidToken,

    /// The action targets a protected account or violates a role guard.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The account state machine rejected the requested move.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A uniqueness conflict (username or email taken).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        let detail = report
            .iter()
            .map(|(path, error)| format!("{}: {}", path, error))
            .collect::<Vec<_>>()
            .join("; ");
        AppError::Validation(detail)
    }
}

impl AppError {
    /// The HTTP status this error is surfaced with.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Redis(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Authentication(_) | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::MissingToken | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidTransition(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Whether the client has to log in again before retrying.
    pub fn requires_login(&self) -> bool {
        matches!(self, AppError::MissingToken | AppError::InvalidToken)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                "Database error".to_string()
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                "Cache error".to_string()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                msg.clone()
            }

            AppError::MissingToken => {
                tracing::debug!("No refresh token presented");
                "No session token, please log in".to_string()
            }

            AppError::InvalidToken => {
                tracing::warn!("Rejected invalid token");
                "Session expired or revoked, please log in".to_string()
            }

            AppError::Forbidden(ref msg) => {
                tracing::warn!("Forbidden: {}", msg);
                msg.clone()
            }

            AppError::InvalidTransition(ref msg) => {
                tracing::debug!("Invalid transition: {}", msg);
                msg.clone()
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                "Resource not found".to_string()
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::Conflict(ref msg) => {
                tracing::debug!("Conflict: {}", msg);
                msg.clone()
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                msg.clone()
            }
        };

        let body = if self.requires_login() {
            sonic_rs::to_string(&sonic_rs::json!({
                "error": message,
                "redirect": LOGIN_REDIRECT
            }))
        } else {
            sonic_rs::to_string(&sonic_rs::json!({
                "error": message
            }))
        }
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_failures_map_to_distinct_statuses() {
        assert_eq!(AppError::MissingToken.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert!(AppError::MissingToken.requires_login());
        assert!(AppError::InvalidToken.requires_login());
        assert!(!AppError::NotFound.requires_login());
    }

    #[test]
    fn moderation_errors_map_to_client_statuses() {
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Forbidden("admin".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::InvalidTransition("to_be_deleted".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let response = AppError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
