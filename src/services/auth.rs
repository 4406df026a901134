use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;

use crate::{
    config::Config,
    crypto::password::{hash_password, verify_password},
    error::{AppError, Result},
    mailer::{LinkPurpose, Mailer, OutboundEmail},
    models::{
        token::{TokenPair, TokenType},
        user::{AccountStatus, User},
    },
    repositories::user as user_repo,
    services::tokens::{self, LogoutSummary},
};

/// Lower-cases and trims an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn send_link(mailer: &dyn Mailer, config: &Config, to: &str, purpose: LinkPurpose, token: &str) {
    let email = OutboundEmail::token_link(&config.app_url, to, purpose, token);
    if let Err(e) = mailer.send(email) {
        tracing::error!("❌ Failed to hand {:?} email to mailer: {}", purpose, e);
    }
}

/// Creates a new account and sends its email confirmation link.
pub async fn register(
    pool: &Pool,
    config: &Config,
    mailer: &dyn Mailer,
    username: &str,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<User> {
    tracing::debug!("🔐 Creating user: {}", username);
    let email = normalize_email(email);
    let password_hash = hash_password(password)?;

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let user = user_repo::create_user(&tx, username, &email, &password_hash).await?;
    let confirmation = tokens::issue_verification_token(
        &tx,
        &config.tokens,
        user.id,
        TokenType::EmailConfirmation,
        now,
    )
    .await?;

    tx.commit().await?;

    send_link(mailer, config, &user.email, LinkPurpose::ConfirmEmail, &confirmation.token);
    tracing::info!("✅ User created with ID: {}", user.id);
    Ok(user)
}

/// Checks credentials and the account state for a login attempt.
pub async fn authenticate_user(pool: &Pool, username: &str, password: &str) -> Result<User> {
    tracing::debug!("🔐 Authenticating user: {}", username);
    let client = pool.get().await?;

    let user = user_repo::find_by_username(&client, username)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

    if !verify_password(password, &user.password_hash)? {
        return Err(AppError::Authentication(
            "Invalid username or password".to_string(),
        ));
    }

    match user.status {
        AccountStatus::Active | AccountStatus::ToBeDeleted => Ok(user),
        AccountStatus::Suspended => Err(AppError::Forbidden(match user.deletion_schedule_date {
            Some(date) => format!("Account suspended until {}", date),
            None => "Account suspended".to_string(),
        })),
        AccountStatus::Deactivated => Err(AppError::Forbidden(
            "Account is deactivated".to_string(),
        )),
    }
}

/// Verifies credentials and opens a new session.
pub async fn login(
    pool: &Pool,
    config: &Config,
    username: &str,
    password: &str,
    ip_address: Option<&str>,
    device: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(User, TokenPair)> {
    let user = authenticate_user(pool, username, password).await?;
    let pair = tokens::open_session(pool, &config.tokens, user.id, ip_address, device, now).await?;
    tracing::info!("✅ User authenticated: {}", user.id);
    Ok((user, pair))
}

/// Replaces the password and logs the user out everywhere, atomically.
pub async fn change_password(
    pool: &Pool,
    user_id: i64,
    old_password: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> Result<LogoutSummary> {
    tracing::info!("🔑 Changing password for user: {}", user_id);

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let user = user_repo::lock_by_id(&tx, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !verify_password(old_password, &user.password_hash)? {
        tx.rollback().await?;
        return Err(AppError::Authentication(
            "Invalid current password".to_string(),
        ));
    }

    let new_hash = hash_password(new_password)?;
    user_repo::update_password(&tx, user_id, &new_hash).await?;
    let summary = tokens::revoke_all_for_user(&tx, user_id, now).await?;

    tx.commit().await?;

    tracing::info!("✅ Password changed for user: {}", user_id);
    Ok(summary)
}

/// Sends a fresh confirmation link to an unverified account.
pub async fn resend_confirmation(
    pool: &Pool,
    config: &Config,
    mailer: &dyn Mailer,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let user = user_repo::lock_by_id(&tx, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if user.is_verified {
        tx.rollback().await?;
        return Err(AppError::Validation("Email is already confirmed".to_string()));
    }

    let confirmation = tokens::issue_verification_token(
        &tx,
        &config.tokens,
        user.id,
        TokenType::EmailConfirmation,
        now,
    )
    .await?;
    tx.commit().await?;

    send_link(mailer, config, &user.email, LinkPurpose::ConfirmEmail, &confirmation.token);
    Ok(())
}

/// Consumes an email confirmation token and marks the account verified.
pub async fn confirm_email(pool: &Pool, token: &str, now: DateTime<Utc>) -> Result<i64> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let consumed = tokens::consume_token(&tx, token, TokenType::EmailConfirmation, now).await?;
    user_repo::mark_verified(&tx, consumed.user_id).await?;

    tx.commit().await?;

    tracing::info!("✅ Email confirmed for user: {}", consumed.user_id);
    Ok(consumed.user_id)
}

/// Emails a password reset link if the address belongs to an account.
///
/// Succeeds either way so the endpoint does not reveal which addresses have accounts.
pub async fn request_password_reset(
    pool: &Pool,
    config: &Config,
    mailer: &dyn Mailer,
    email: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let email = normalize_email(email);
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let user = match user_repo::find_by_email(&tx, &email).await? {
        Some(user) if user.status != AccountStatus::Deactivated => user,
        _ => {
            tx.rollback().await?;
            tracing::debug!("Password reset requested for unknown or closed account");
            return Ok(());
        }
    };
    user_repo::lock_by_id(&tx, user.id).await?;

    let reset = tokens::issue_verification_token(
        &tx,
        &config.tokens,
        user.id,
        TokenType::PasswordReset,
        now,
    )
    .await?;
    tx.commit().await?;

    send_link(mailer, config, &user.email, LinkPurpose::ResetPassword, &reset.token);
    Ok(())
}

/// Consumes a reset token, stores the new password and ends every session.
pub async fn reset_password(
    pool: &Pool,
    token: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> Result<LogoutSummary> {
    let new_hash = hash_password(new_password)?;

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let consumed = tokens::consume_token(&tx, token, TokenType::PasswordReset, now).await?;
    user_repo::update_password(&tx, consumed.user_id, &new_hash).await?;
    let summary = tokens::revoke_all_for_user(&tx, consumed.user_id, now).await?;

    tx.commit().await?;

    tracing::info!("✅ Password reset for user: {}", consumed.user_id);
    Ok(summary)
}

/// Updates the owner-editable settings.
pub async fn update_settings(pool: &Pool, user_id: i64, holiday_mode: bool) -> Result<User> {
    let client = pool.get().await?;
    user_repo::set_holiday_mode(&client, user_id, holiday_mode).await
}
