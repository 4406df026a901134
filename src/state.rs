use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use crate::config::Config;
use crate::error::Result;
use crate::mailer::{LogMailer, Mailer};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The Redis connection manager, used for attempt counters.
    pub redis: ConnectionManager,
    /// The application's configuration.
    pub config: Config,
    /// Where confirmation and reset links are handed off.
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Connects to PostgreSQL and Redis.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url, config.db_pool_max_size)?;
        tracing::info!(
            "✅ PostgreSQL pool initialized (max {} connections)",
            config.db_pool_max_size
        );

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized");

        Ok(AppState {
            db,
            redis,
            config: config.clone(),
            mailer: Arc::new(LogMailer),
        })
    }
}
