use chrono::NaiveDate;
use deadpool_postgres::Pool;

use crate::{error::Result, services::lifecycle};

/// Lifts every suspension whose date is on or before `today`.
pub async fn sweep_elapsed_suspensions(pool: &Pool, today: NaiveDate) -> Result<Vec<i64>> {
    let reactivated = lifecycle::reactivate_elapsed_suspensions(pool, today).await?;
    for user_id in &reactivated {
        tracing::debug!("✅ Suspension of user {} elapsed", user_id);
    }
    Ok(reactivated)
}
