//! Periodic background tasks.
//!
//! Each sweeper waits on its timer or the shutdown token. A run that has
//! started is never interrupted; cancellation is only observed between runs.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use deadpool_postgres::Pool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    jobs::{suspension_sweeper, token_sweeper},
};

/// Time left until the next `at` (UTC) strictly after `now`.
pub fn duration_until_next(now: DateTime<Utc>, at: NaiveTime) -> Duration {
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Starts both sweepers. The handles finish once `shutdown` is cancelled.
pub fn spawn_sweepers(pool: Pool, config: &Config, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    let token_interval = Duration::from_secs(config.token_sweep_interval_secs);
    let sweep_at = config.suspension_sweep_at;

    let token_task = tokio::spawn(run_token_sweeper(pool.clone(), token_interval, shutdown.clone()));
    let suspension_task = tokio::spawn(run_suspension_sweeper(pool, sweep_at, shutdown));

    tracing::info!(
        "✅ Background sweepers started (tokens every {}s, suspensions daily at {} UTC)",
        token_interval.as_secs(),
        sweep_at.format("%H:%M")
    );

    vec![token_task, suspension_task]
}

async fn run_token_sweeper(pool: Pool, interval: Duration, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        tracing::info!("🧹 Sweeping expired refresh tokens...");
        match token_sweeper::sweep_expired_refresh_tokens(&pool, Utc::now()).await {
            Ok(report) if report.is_empty() => {
                tracing::debug!("🧹 No expired refresh tokens");
            }
            Ok(report) => {
                tracing::info!(
                    "✅ Token sweep invalidated {} tokens and ended {} sessions",
                    report.tokens_invalidated,
                    report.sessions_ended
                );
            }
            Err(e) => {
                tracing::error!("❌ Token sweep failed: {}", e);
            }
        }
    }
    tracing::info!("🛑 Token sweeper stopped");
}

async fn run_suspension_sweeper(pool: Pool, at: NaiveTime, shutdown: CancellationToken) {
    loop {
        let wait = duration_until_next(Utc::now(), at);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        tracing::info!("🧹 Reactivating elapsed suspensions...");
        match suspension_sweeper::sweep_elapsed_suspensions(&pool, Utc::now().date_naive()).await {
            Ok(reactivated) => {
                tracing::info!("✅ Suspension sweep reactivated {} accounts", reactivated.len());
            }
            Err(e) => {
                tracing::error!("❌ Suspension sweep failed: {}", e);
            }
        }
    }
    tracing::info!("🛑 Suspension sweeper stopped");
}
