use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;

use crate::{
    error::{AppError, Result},
    models::session::Session,
};

/// Records a new login session.
pub async fn create_session<C: GenericClient>(
    client: &C,
    user_id: i64,
    start_time: DateTime<Utc>,
    ip_address: Option<&str>,
    device: Option<&str>,
) -> Result<Session> {
    let row = client
        .query_one(
            r#"
            INSERT INTO sessions (user_id, start_time, ip_address, device)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, start_time, end_time, ip_address, device
            "#,
            &[&user_id, &start_time, &ip_address, &device],
        )
        .await?;
    Session::try_from(&row)
}

/// Finds a session by its ID.
pub async fn find_by_id<C: GenericClient>(client: &C, session_id: i64) -> Result<Option<Session>> {
    let row = client
        .query_opt(
            r#"
            SELECT id, user_id, start_time, end_time, ip_address, device
            FROM sessions
            WHERE id = $1
            "#,
            &[&session_id],
        )
        .await?;
    row.map(|r| Session::try_from(&r)).transpose()
}

/// Locks a session row until the surrounding transaction ends.
pub async fn lock_by_id<C: GenericClient>(client: &C, session_id: i64) -> Result<Option<Session>> {
    let row = client
        .query_opt(
            r#"
            SELECT id, user_id, start_time, end_time, ip_address, device
            FROM sessions
            WHERE id = $1
            FOR NO KEY UPDATE
            "#,
            &[&session_id],
        )
        .await?;
    row.map(|r| Session::try_from(&r)).transpose()
}

/// Locks the given sessions in ID order. Returns the IDs that exist.
pub async fn lock_many<C: GenericClient>(client: &C, session_ids: &[i64]) -> Result<Vec<i64>> {
    if session_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = client
        .query(
            "SELECT id FROM sessions WHERE id = ANY($1) ORDER BY id FOR NO KEY UPDATE",
            &[&session_ids],
        )
        .await?;
    rows.iter()
        .map(|row| row.try_get::<_, i64>("id").map_err(AppError::from))
        .collect()
}

/// Ends every open session of a user. Returns how many were closed.
pub async fn end_all_for_user<C: GenericClient>(
    client: &C,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let ended = client
        .execute(
            r#"
            UPDATE sessions
            SET end_time = $1
            WHERE id IN (
                SELECT id FROM sessions
                WHERE user_id = $2 AND end_time IS NULL
                ORDER BY id
                FOR NO KEY UPDATE
            )
            "#,
            &[&now, &user_id],
        )
        .await?;
    Ok(ended)
}

/// Ends one session if it is still open. Returns whether it was open.
pub async fn end_session<C: GenericClient>(
    client: &C,
    session_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let ended = client
        .execute(
            "UPDATE sessions SET end_time = $1 WHERE id = $2 AND end_time IS NULL",
            &[&now, &session_id],
        )
        .await?;
    Ok(ended > 0)
}

/// Ends the given sessions; already ended ones keep their original end time.
pub async fn end_sessions<C: GenericClient>(
    client: &C,
    session_ids: &[i64],
    now: DateTime<Utc>,
) -> Result<u64> {
    if session_ids.is_empty() {
        return Ok(0);
    }
    client
        .execute(
            "UPDATE sessions SET end_time = $1 WHERE id = ANY($2) AND end_time IS NULL",
            &[&now, &session_ids],
        )
        .await
        .map_err(AppError::from)
}
