//! Session and token manager.
//!
//! Issues, verifies, rotates and invalidates tokens. Every multi-row change
//! runs inside one transaction; the `*_for_user` helpers take the caller's
//! transaction so they can be combined with other writes (password change,
//! suspension).
//!
//! Row locks are always taken in the order users, sessions, tokens. A token
//! is therefore looked up without a lock first, its owner is locked, and only
//! then is the token itself locked and checked again.

use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::{GenericClient, Pool};

use crate::{
    config::TokenSettings,
    crypto::token::generate_token,
    error::{AppError, Result},
    models::{
        session::{AuthUser, Session},
        token::{IssuedToken, Token, TokenPair, TokenType},
        user::{AccountStatus, User},
    },
    repositories::{session as session_repo, token as token_repo, user as user_repo},
};

/// What a logout closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LogoutSummary {
    pub sessions_ended: u64,
    pub tokens_invalidated: u64,
}

/// Rejects a token that is invalidated or past its expiry.
pub fn ensure_usable(token: &Token, now: DateTime<Utc>) -> Result<()> {
    if token.is_usable(now) {
        Ok(())
    } else {
        Err(AppError::InvalidToken)
    }
}

/// Stores a freshly generated token of any type.
pub async fn issue_token<C: GenericClient>(
    client: &C,
    user_id: i64,
    session_id: Option<i64>,
    token_type: TokenType,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<IssuedToken> {
    let token = generate_token();
    let expires_at = now + ttl;
    token_repo::insert_token(client, &token, user_id, session_id, token_type, expires_at).await?;
    Ok(IssuedToken { token, expires_at })
}

/// Short-lived credential for API calls under a session.
pub async fn issue_access_token<C: GenericClient>(
    client: &C,
    settings: &TokenSettings,
    user_id: i64,
    session_id: i64,
    now: DateTime<Utc>,
) -> Result<IssuedToken> {
    issue_token(client, user_id, Some(session_id), TokenType::Access, settings.access_ttl, now).await
}

/// Long-lived credential recorded against a session.
pub async fn issue_refresh_token<C: GenericClient>(
    client: &C,
    settings: &TokenSettings,
    user_id: i64,
    session_id: i64,
    now: DateTime<Utc>,
) -> Result<IssuedToken> {
    issue_token(client, user_id, Some(session_id), TokenType::Refresh, settings.refresh_ttl, now).await
}

async fn issue_pair<C: GenericClient>(
    client: &C,
    settings: &TokenSettings,
    user_id: i64,
    session_id: i64,
    now: DateTime<Utc>,
) -> Result<TokenPair> {
    let access = issue_access_token(client, settings, user_id, session_id, now).await?;
    let refresh = issue_refresh_token(client, settings, user_id, session_id, now).await?;
    Ok(TokenPair {
        session_id,
        access,
        refresh,
    })
}

/// Starts a session at login and hands out its first token pair.
pub async fn open_session(
    pool: &Pool,
    settings: &TokenSettings,
    user_id: i64,
    ip_address: Option<&str>,
    device: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TokenPair> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let session = session_repo::create_session(&tx, user_id, now, ip_address, device).await?;
    let pair = issue_pair(&tx, settings, user_id, session.id, now).await?;

    tx.commit().await?;

    tracing::info!("🔑 Session {} opened for user {}", session.id, user_id);
    Ok(pair)
}

/// Exchanges a refresh token for a new access/refresh pair.
///
/// Every live refresh token of the session is invalidated, not only the
/// presented one, so a stale token from an earlier rotation can never be
/// replayed. Two concurrent calls with the same token serialize on the
/// session lock and the second one fails with `InvalidToken`.
pub async fn refresh_session(
    pool: &Pool,
    settings: &TokenSettings,
    presented: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TokenPair> {
    let presented = match presented {
        Some(token) if !token.is_empty() => token,
        _ => return Err(AppError::MissingToken),
    };

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let session_id = match token_repo::find(&tx, presented, TokenType::Refresh).await? {
        Some(Token {
            session_id: Some(session_id),
            ..
        }) => session_id,
        _ => {
            tx.rollback().await?;
            return Err(AppError::InvalidToken);
        }
    };

    let session = match session_repo::lock_by_id(&tx, session_id).await? {
        Some(session) if session.is_open() => session,
        _ => {
            tx.rollback().await?;
            return Err(AppError::InvalidToken);
        }
    };

    let token = match token_repo::lock(&tx, presented, TokenType::Refresh).await? {
        Some(token) if token.session_id == Some(session.id) => token,
        _ => {
            tx.rollback().await?;
            return Err(AppError::InvalidToken);
        }
    };

    if let Err(e) = ensure_usable(&token, now) {
        tx.rollback().await?;
        return Err(e);
    }

    token_repo::invalidate_session_tokens_of_type(&tx, session.id, TokenType::Refresh, now).await?;
    token_repo::invalidate(&tx, &token.token, now).await?;

    let pair = issue_pair(&tx, settings, token.user_id, session.id, now).await?;

    tx.commit().await?;

    tracing::debug!("🔄 Session {} rotated for user {}", session.id, token.user_id);
    Ok(pair)
}

/// Ends every open session and invalidates every live token of a user inside
/// the caller's transaction.
///
/// The user row is locked first, so concurrent revocations for the same user
/// and single-use token consumption queue behind each other.
pub async fn revoke_all_for_user<C: GenericClient>(
    client: &C,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<LogoutSummary> {
    user_repo::lock_by_id(client, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let sessions_ended = session_repo::end_all_for_user(client, user_id, now).await?;
    let tokens_invalidated = token_repo::invalidate_all_for_user(client, user_id, now).await?;
    Ok(LogoutSummary {
        sessions_ended,
        tokens_invalidated,
    })
}

/// Logs a user out everywhere.
pub async fn global_logout(pool: &Pool, user_id: i64, now: DateTime<Utc>) -> Result<LogoutSummary> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;
    let summary = revoke_all_for_user(&tx, user_id, now).await?;
    tx.commit().await?;

    tracing::info!(
        "👋 Global logout for user {}: {} sessions, {} tokens",
        user_id,
        summary.sessions_ended,
        summary.tokens_invalidated
    );
    Ok(summary)
}

/// Logs out a single session.
pub async fn logout(pool: &Pool, session_id: i64, now: DateTime<Utc>) -> Result<LogoutSummary> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    if session_repo::lock_by_id(&tx, session_id).await?.is_none() {
        tx.rollback().await?;
        return Err(AppError::NotFound);
    }

    let ended = session_repo::end_session(&tx, session_id, now).await?;
    let tokens_invalidated = token_repo::invalidate_all_for_session(&tx, session_id, now).await?;
    tx.commit().await?;

    tracing::info!("👋 Session {} logged out", session_id);
    Ok(LogoutSummary {
        sessions_ended: u64::from(ended),
        tokens_invalidated,
    })
}

/// Resolves an access token to the user and session it was issued for.
///
/// Only accounts that are `active` or waiting for deletion may act.
pub async fn authenticate(pool: &Pool, access_token: &str, now: DateTime<Utc>) -> Result<(AuthUser, User)> {
    let client = pool.get().await?;

    let token = token_repo::find(&client, access_token, TokenType::Access)
        .await?
        .ok_or(AppError::InvalidToken)?;
    ensure_usable(&token, now)?;

    let session_id = token.session_id.ok_or(AppError::InvalidToken)?;
    let session: Session = session_repo::find_by_id(&client, session_id)
        .await?
        .ok_or(AppError::InvalidToken)?;
    if !session.is_open() {
        return Err(AppError::InvalidToken);
    }

    let user = user_repo::find_by_id(&client, token.user_id)
        .await?
        .ok_or(AppError::InvalidToken)?;

    match user.status {
        AccountStatus::Active | AccountStatus::ToBeDeleted => {}
        status => {
            return Err(AppError::Forbidden(format!("Account is {}", status)));
        }
    }

    Ok((
        AuthUser {
            user_id: user.id,
            session_id,
            is_admin: user.is_admin,
        },
        user,
    ))
}

/// Issues a single-use email confirmation or password reset token.
///
/// Earlier live tokens of the same type for the user are invalidated so only
/// the most recent link works.
pub async fn issue_verification_token<C: GenericClient>(
    client: &C,
    settings: &TokenSettings,
    user_id: i64,
    token_type: TokenType,
    now: DateTime<Utc>,
) -> Result<IssuedToken> {
    let ttl = match token_type {
        TokenType::EmailConfirmation => settings.email_confirmation_ttl,
        TokenType::PasswordReset => settings.password_reset_ttl,
        TokenType::Access | TokenType::Refresh => {
            return Err(AppError::Internal(format!(
                "{:?} tokens belong to a session",
                token_type
            )));
        }
    };

    token_repo::invalidate_user_tokens_of_type(client, user_id, token_type, now).await?;
    issue_token(client, user_id, None, token_type, ttl, now).await
}

/// Locks, checks and invalidates a single-use token inside the caller's
/// transaction.
///
/// The owning user row is locked before the token, so a concurrent password
/// change or logout of the same user queues behind this call or ahead of it.
pub async fn consume_token<C: GenericClient>(
    client: &C,
    presented: &str,
    token_type: TokenType,
    now: DateTime<Utc>,
) -> Result<Token> {
    let owner = token_repo::find(client, presented, token_type)
        .await?
        .ok_or(AppError::InvalidToken)?
        .user_id;
    user_repo::lock_by_id(client, owner)
        .await?
        .ok_or(AppError::InvalidToken)?;

    let token = token_repo::lock(client, presented, token_type)
        .await?
        .ok_or(AppError::InvalidToken)?;
    ensure_usable(&token, now)?;
    token_repo::invalidate(client, &token.token, now).await?;
    Ok(token)
}
