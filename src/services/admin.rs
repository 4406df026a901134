use chrono::{DateTime, NaiveDate, Utc};
use deadpool_postgres::Pool;

use crate::{
    error::Result,
    models::user::DeletionCandidate,
    repositories::user as user_repo,
    services::lifecycle::{self, LifecycleState},
};

/// Suspends an active account or lifts a suspension.
pub async fn toggle_suspension(
    pool: &Pool,
    admin_id: i64,
    user_id: i64,
    suspension_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<LifecycleState> {
    tracing::info!("🛡️ Admin {} toggling suspension of user {}", admin_id, user_id);
    lifecycle::toggle_suspension(pool, user_id, suspension_date, now).await
}

/// Accounts whose deletion date has been reached.
pub async fn list_deletion_candidates(
    pool: &Pool,
    today: NaiveDate,
) -> Result<Vec<DeletionCandidate>> {
    let client = pool.get().await?;
    user_repo::list_deletion_candidates(&client, today).await
}

/// Permanently removes an account whose deletion date has been reached.
pub async fn delete_user(pool: &Pool, admin_id: i64, user_id: i64, today: NaiveDate) -> Result<()> {
    tracing::info!("🛡️ Admin {} deleting user {}", admin_id, user_id);
    lifecycle::delete_account(pool, user_id, today).await
}
