use anyhow::{Context, Result};
use chrono::{Duration, NaiveTime};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Lifetimes of the tokens the service issues.
#[derive(Clone, Debug)]
pub struct TokenSettings {
    /// Access tokens authorize individual API calls.
    pub access_ttl: Duration,
    /// Refresh tokens are exchanged for a new access/refresh pair.
    pub refresh_ttl: Duration,
    /// Email confirmation links.
    pub email_confirmation_ttl: Duration,
    /// Password reset links.
    pub password_reset_ttl: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            email_confirmation_ttl: Duration::hours(24),
            password_reset_ttl: Duration::minutes(60),
        }
    }
}

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// Maximum number of pooled PostgreSQL connections.
    pub db_pool_max_size: usize,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Public base URL used to build links in outgoing emails.
    pub app_url: String,
    /// Whether cookies are marked `Secure`.
    pub production: bool,
    /// Origin allowed by CORS.
    pub cors_origin: String,
    /// Token lifetimes.
    pub tokens: TokenSettings,
    /// Days between a user's deletion request and the date an admin may delete the account.
    pub deletion_grace_days: i64,
    /// Seconds between two token sweeper runs.
    pub token_sweep_interval_secs: u64,
    /// UTC time of day the suspension sweeper runs.
    pub suspension_sweep_at: NaiveTime,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a `Config` from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let tokens = TokenSettings {
            access_ttl: Duration::minutes(parse_or(&lookup, "ACCESS_TOKEN_TTL_MINUTES", 15)?),
            refresh_ttl: Duration::days(parse_or(&lookup, "REFRESH_TOKEN_TTL_DAYS", 7)?),
            email_confirmation_ttl: Duration::hours(parse_or(&lookup, "EMAIL_TOKEN_TTL_HOURS", 24)?),
            password_reset_ttl: Duration::minutes(parse_or(
                &lookup,
                "PASSWORD_RESET_TTL_MINUTES",
                60,
            )?),
        };

        if tokens.access_ttl >= tokens.refresh_ttl {
            anyhow::bail!("ACCESS_TOKEN_TTL_MINUTES must be shorter than REFRESH_TOKEN_TTL_DAYS");
        }

        let suspension_sweep_at = match lookup("SUSPENSION_SWEEP_AT") {
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M")
                .with_context(|| format!("Invalid SUSPENSION_SWEEP_AT '{}', expected HH:MM", raw))?,
            None => NaiveTime::from_hms_opt(0, 5, 0).context("invalid default sweep time")?,
        };

        let token_sweep_interval_secs: u64 = parse_or(&lookup, "TOKEN_SWEEP_INTERVAL_SECS", 3600)?;
        if token_sweep_interval_secs == 0 {
            anyhow::bail!("TOKEN_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            database_url,
            db_pool_max_size: parse_or(&lookup, "DB_POOL_MAX_SIZE", 32)?,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            app_url: lookup("APP_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            production: lookup("APP_ENV").as_deref() == Some("production"),
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string()),
            tokens,
            deletion_grace_days: parse_or(&lookup, "DELETION_GRACE_DAYS", 30)?,
            token_sweep_interval_secs,
            suspension_sweep_at,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}
