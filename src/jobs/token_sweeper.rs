use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;

use crate::{
    error::Result,
    repositories::{session as session_repo, token as token_repo},
};

/// What one run of the token sweeper changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tokens_invalidated: u64,
    pub sessions_ended: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.tokens_invalidated == 0 && self.sessions_ended == 0
    }
}

fn session_ids_of(tokens: &[crate::models::token::Token]) -> Vec<i64> {
    let mut ids: Vec<i64> = tokens.iter().filter_map(|token| token.session_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Invalidates refresh tokens that expired without being rotated and ends the
/// sessions they belonged to.
///
/// Sessions are locked before their tokens, the same order every other
/// writer uses. Tokens rotated or revoked while the sweep waited for those
/// locks are left alone.
pub async fn sweep_expired_refresh_tokens(pool: &Pool, now: DateTime<Utc>) -> Result<SweepReport> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let candidates = token_repo::find_expired_refresh_tokens(&tx, now).await?;
    if candidates.is_empty() {
        tx.rollback().await?;
        return Ok(SweepReport::default());
    }

    session_repo::lock_many(&tx, &session_ids_of(&candidates)).await?;

    let values: Vec<String> = candidates.into_iter().map(|token| token.token).collect();
    let expired = token_repo::lock_expired_refresh_tokens(&tx, &values, now).await?;
    if expired.is_empty() {
        tx.rollback().await?;
        return Ok(SweepReport::default());
    }

    let values: Vec<String> = expired.iter().map(|token| token.token.clone()).collect();
    let tokens_invalidated = token_repo::invalidate_many(&tx, &values, now).await?;
    let sessions_ended = session_repo::end_sessions(&tx, &session_ids_of(&expired), now).await?;

    tx.commit().await?;

    Ok(SweepReport {
        tokens_invalidated,
        sessions_ended,
    })
}
