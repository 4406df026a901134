use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use crate::error::AppError;

/// Purpose of a token (`tokens.token_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "token_type")]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    #[postgres(name = "access")]
    Access,
    #[postgres(name = "refresh")]
    Refresh,
    #[postgres(name = "email_confirmation")]
    EmailConfirmation,
    #[postgres(name = "password_reset")]
    PasswordReset,
}

/// A persisted token. The opaque value is the primary key.
#[derive(Debug, Clone)]
pub struct Token {
    pub token: String,
    pub user_id: i64,
    pub session_id: Option<i64>,
    pub token_type: TokenType,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub invalidated: bool,
}

impl Token {
    /// A token is usable only while it is not invalidated and `now < expires_at`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.invalidated && now < self.expires_at
    }
}

impl TryFrom<&Row> for Token {
    type Error = AppError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            token: row.try_get("token")?,
            user_id: row.try_get("user_id")?,
            session_id: row.try_get("session_id")?,
            token_type: row.try_get("token_type")?,
            expires_at: row.try_get("expires_at")?,
            last_used_at: row.try_get("last_used_at")?,
            invalidated: row.try_get("invalidated")?,
        })
    }
}

/// A freshly issued token value with its expiry.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// The access/refresh pair handed out at login and on every rotation.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub session_id: i64,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(invalidated: bool, expires_at: DateTime<Utc>) -> Token {
        Token {
            token: "T1".into(),
            user_id: 1,
            session_id: Some(1),
            token_type: TokenType::Refresh,
            expires_at,
            last_used_at: None,
            invalidated,
        }
    }

    #[test]
    fn usable_requires_both_conditions() {
        let now = Utc::now();
        assert!(token(false, now + Duration::minutes(1)).is_usable(now));
        assert!(!token(true, now + Duration::minutes(1)).is_usable(now));
        assert!(!token(false, now - Duration::seconds(1)).is_usable(now));
        // expiry instant itself is already unusable
        assert!(!token(false, now).is_usable(now));
    }
}
