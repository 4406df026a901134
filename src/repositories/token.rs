use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use tokio_postgres::error::SqlState;

use crate::{
    error::{AppError, Result},
    models::token::{Token, TokenType},
};

const TOKEN_COLUMNS: &str =
    "token, user_id, session_id, token_type, expires_at, last_used_at, invalidated";

/// Stores a new token. A key collision is a hard failure, never an overwrite.
pub async fn insert_token<C: GenericClient>(
    client: &C,
    token: &str,
    user_id: i64,
    session_id: Option<i64>,
    token_type: TokenType,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    client
        .execute(
            r#"
            INSERT INTO tokens (token, user_id, session_id, token_type, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            &[&token, &user_id, &session_id, &token_type, &expires_at],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                AppError::Internal("Token key collision".to_string())
            } else {
                AppError::Database(e)
            }
        })?;
    Ok(())
}

/// Finds a token by key and type without locking it.
pub async fn find<C: GenericClient>(
    client: &C,
    token: &str,
    token_type: TokenType,
) -> Result<Option<Token>> {
    let query = format!(
        "SELECT {} FROM tokens WHERE token = $1 AND token_type = $2",
        TOKEN_COLUMNS
    );
    let row = client.query_opt(query.as_str(), &[&token, &token_type]).await?;
    row.map(|r| Token::try_from(&r)).transpose()
}

/// Finds a token by key and type and locks the row until the transaction ends.
///
/// Concurrent callers presenting the same token queue on this lock.
pub async fn lock<C: GenericClient>(
    client: &C,
    token: &str,
    token_type: TokenType,
) -> Result<Option<Token>> {
    let query = format!(
        "SELECT {} FROM tokens WHERE token = $1 AND token_type = $2 FOR UPDATE",
        TOKEN_COLUMNS
    );
    let row = client.query_opt(query.as_str(), &[&token, &token_type]).await?;
    row.map(|r| Token::try_from(&r)).transpose()
}

/// Invalidates a single token and stamps its last use.
pub async fn invalidate<C: GenericClient>(client: &C, token: &str, now: DateTime<Utc>) -> Result<()> {
    client
        .execute(
            "UPDATE tokens SET invalidated = true, last_used_at = $1 WHERE token = $2",
            &[&now, &token],
        )
        .await?;
    Ok(())
}

// Bulk invalidations lock their rows in key order first so that two
// transactions touching overlapping token sets queue instead of deadlocking.

/// Invalidates every live token of one type within a session.
pub async fn invalidate_session_tokens_of_type<C: GenericClient>(
    client: &C,
    session_id: i64,
    token_type: TokenType,
    now: DateTime<Utc>,
) -> Result<u64> {
    let invalidated = client
        .execute(
            r#"
            UPDATE tokens
            SET invalidated = true, last_used_at = $1
            WHERE token IN (
                SELECT token FROM tokens
                WHERE session_id = $2 AND token_type = $3 AND invalidated = false
                ORDER BY token
                FOR UPDATE
            )
            "#,
            &[&now, &session_id, &token_type],
        )
        .await?;
    Ok(invalidated)
}

/// Invalidates every live token issued under a session.
pub async fn invalidate_all_for_session<C: GenericClient>(
    client: &C,
    session_id: i64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let invalidated = client
        .execute(
            r#"
            UPDATE tokens
            SET invalidated = true, last_used_at = $1
            WHERE token IN (
                SELECT token FROM tokens
                WHERE session_id = $2 AND invalidated = false
                ORDER BY token
                FOR UPDATE
            )
            "#,
            &[&now, &session_id],
        )
        .await?;
    Ok(invalidated)
}

/// Invalidates every live token of a user, session-bound or not.
pub async fn invalidate_all_for_user<C: GenericClient>(
    client: &C,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let invalidated = client
        .execute(
            r#"
            UPDATE tokens
            SET invalidated = true, last_used_at = $1
            WHERE token IN (
                SELECT token FROM tokens
                WHERE user_id = $2 AND invalidated = false
                ORDER BY token
                FOR UPDATE
            )
            "#,
            &[&now, &user_id],
        )
        .await?;
    Ok(invalidated)
}

/// Invalidates every live token of one type owned by a user.
pub async fn invalidate_user_tokens_of_type<C: GenericClient>(
    client: &C,
    user_id: i64,
    token_type: TokenType,
    now: DateTime<Utc>,
) -> Result<u64> {
    let invalidated = client
        .execute(
            r#"
            UPDATE tokens
            SET invalidated = true, last_used_at = $1
            WHERE token IN (
                SELECT token FROM tokens
                WHERE user_id = $2 AND token_type = $3 AND invalidated = false
                ORDER BY token
                FOR UPDATE
            )
            "#,
            &[&now, &user_id, &token_type],
        )
        .await?;
    Ok(invalidated)
}

/// Expired refresh tokens that were never invalidated. Not locked.
pub async fn find_expired_refresh_tokens<C: GenericClient>(
    client: &C,
    now: DateTime<Utc>,
) -> Result<Vec<Token>> {
    let query = format!(
        r#"
        SELECT {}
        FROM tokens
        WHERE token_type = 'refresh' AND invalidated = false AND expires_at < $1
        "#,
        TOKEN_COLUMNS
    );
    let rows = client.query(query.as_str(), &[&now]).await?;
    rows.iter().map(Token::try_from).collect()
}

/// Locks those of `tokens` that are still live refresh tokens expired at `now`.
///
/// Callers hold the owning session locks already; rows rotated or revoked in
/// the meantime drop out of the result.
pub async fn lock_expired_refresh_tokens<C: GenericClient>(
    client: &C,
    tokens: &[String],
    now: DateTime<Utc>,
) -> Result<Vec<Token>> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    let query = format!(
        r#"
        SELECT {}
        FROM tokens
        WHERE token = ANY($1)
          AND token_type = 'refresh' AND invalidated = false AND expires_at < $2
        ORDER BY token
        FOR UPDATE
        "#,
        TOKEN_COLUMNS
    );
    let rows = client.query(query.as_str(), &[&tokens, &now]).await?;
    rows.iter().map(Token::try_from).collect()
}

/// Invalidates the given tokens in one statement.
pub async fn invalidate_many<C: GenericClient>(
    client: &C,
    tokens: &[String],
    now: DateTime<Utc>,
) -> Result<u64> {
    if tokens.is_empty() {
        return Ok(0);
    }
    let invalidated = client
        .execute(
            r#"
            UPDATE tokens
            SET invalidated = true, last_used_at = $1
            WHERE token = ANY($2) AND invalidated = false
            "#,
            &[&now, &tokens],
        )
        .await?;
    Ok(invalidated)
}
