use chrono::NaiveDate;
use deadpool_postgres::GenericClient;
use tokio_postgres::error::SqlState;

use crate::{
    error::{AppError, Result},
    models::user::{AccountStatus, DeletionCandidate, User},
};

const USER_COLUMNS: &str = "id, username, email, password_hash, image, is_admin, is_verified, \
     holiday_mode, status, deletion_schedule_date, follower_count, following_count, \
     seller_rating, review_count, created_at, updated_at";

/// Inserts a new active account.
pub async fn create_user<C: GenericClient>(
    client: &C,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<User> {
    let query = format!(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING {}",
        USER_COLUMNS
    );

    let row = client
        .query_one(query.as_str(), &[&username, &email, &password_hash])
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                let field = match e.as_db_error().and_then(|db| db.constraint()) {
                    Some(c) if c.contains("email") => "email",
                    _ => "username",
                };
                AppError::Conflict(format!("This {} is already taken", field))
            } else {
                AppError::Database(e)
            }
        })?;

    User::try_from(&row)
}

/// Finds a user by their ID.
pub async fn find_by_id<C: GenericClient>(client: &C, user_id: i64) -> Result<Option<User>> {
    let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    let row = client.query_opt(query.as_str(), &[&user_id]).await?;
    row.map(|r| User::try_from(&r)).transpose()
}

/// Finds a user by ID and locks the row until the surrounding transaction ends.
///
/// `NO KEY UPDATE` leaves concurrent inserts of sessions and tokens that
/// reference the user unblocked.
pub async fn lock_by_id<C: GenericClient>(client: &C, user_id: i64) -> Result<Option<User>> {
    let query = format!("SELECT {} FROM users WHERE id = $1 FOR NO KEY UPDATE", USER_COLUMNS);
    let row = client.query_opt(query.as_str(), &[&user_id]).await?;
    row.map(|r| User::try_from(&r)).transpose()
}

/// Finds a user by their username.
pub async fn find_by_username<C: GenericClient>(client: &C, username: &str) -> Result<Option<User>> {
    let query = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
    let row = client.query_opt(query.as_str(), &[&username]).await?;
    row.map(|r| User::try_from(&r)).transpose()
}

/// Finds a user by their email address.
pub async fn find_by_email<C: GenericClient>(client: &C, email: &str) -> Result<Option<User>> {
    let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
    let row = client.query_opt(query.as_str(), &[&email]).await?;
    row.map(|r| User::try_from(&r)).transpose()
}

/// Writes a lifecycle state. Only `services::lifecycle` calls this.
pub async fn set_status<C: GenericClient>(
    client: &C,
    user_id: i64,
    status: AccountStatus,
    deletion_schedule_date: Option<NaiveDate>,
) -> Result<()> {
    let updated = client
        .execute(
            r#"
            UPDATE users
            SET status = $1, deletion_schedule_date = $2, updated_at = NOW()
            WHERE id = $3
            "#,
            &[&status, &deletion_schedule_date, &user_id],
        )
        .await?;

    if updated == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Moves every suspended account whose schedule date has passed back to active.
///
/// Returns the IDs of the reactivated accounts.
pub async fn reactivate_elapsed_suspensions<C: GenericClient>(
    client: &C,
    today: NaiveDate,
) -> Result<Vec<i64>> {
    let rows = client
        .query(
            r#"
            UPDATE users
            SET status = 'active', deletion_schedule_date = NULL, updated_at = NOW()
            WHERE status = 'suspended' AND deletion_schedule_date <= $1
            RETURNING id
            "#,
            &[&today],
        )
        .await?;

    rows.iter()
        .map(|row| row.try_get::<_, i64>("id").map_err(AppError::from))
        .collect()
}

/// Accounts scheduled for deletion whose date has been reached.
pub async fn list_deletion_candidates<C: GenericClient>(
    client: &C,
    today: NaiveDate,
) -> Result<Vec<DeletionCandidate>> {
    let rows = client
        .query(
            r#"
            SELECT id, username, image, deletion_schedule_date
            FROM users
            WHERE status = 'to_be_deleted' AND deletion_schedule_date <= $1
            ORDER BY deletion_schedule_date ASC, id ASC
            "#,
            &[&today],
        )
        .await?;

    rows.iter().map(DeletionCandidate::try_from).collect()
}

/// Permanently removes an account; sessions and tokens cascade.
pub async fn delete_user<C: GenericClient>(client: &C, user_id: i64) -> Result<()> {
    let deleted = client
        .execute("DELETE FROM users WHERE id = $1", &[&user_id])
        .await?;

    if deleted == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Stores a new password hash.
pub async fn update_password<C: GenericClient>(
    client: &C,
    user_id: i64,
    password_hash: &str,
) -> Result<()> {
    client
        .execute(
            "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2",
            &[&password_hash, &user_id],
        )
        .await?;
    Ok(())
}

/// Marks the account's email address as confirmed.
pub async fn mark_verified<C: GenericClient>(client: &C, user_id: i64) -> Result<()> {
    client
        .execute(
            "UPDATE users SET is_verified = true, updated_at = NOW() WHERE id = $1",
            &[&user_id],
        )
        .await?;
    Ok(())
}

/// Toggles the seller's holiday mode.
pub async fn set_holiday_mode<C: GenericClient>(
    client: &C,
    user_id: i64,
    holiday_mode: bool,
) -> Result<User> {
    let query = format!(
        "UPDATE users SET holiday_mode = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
        USER_COLUMNS
    );
    let row = client
        .query_opt(query.as_str(), &[&holiday_mode, &user_id])
        .await?
        .ok_or(AppError::NotFound)?;
    User::try_from(&row)
}
