#![allow(dead_code)]

use bookswap_accounts::{
    config::Config,
    crypto::password::hash_password,
    db,
    models::user::User,
    repositories::user as user_repo,
};
use chrono::{DateTime, NaiveDate, Utc};
use deadpool_postgres::Pool;

pub const PASSWORD: &str = "paperback42";

/// A throwaway schema holding a fresh copy of the tables.
pub struct TestDb {
    pub pool: Pool,
    admin: Pool,
    schema: String,
}

impl TestDb {
    /// `None` when `TEST_DATABASE_URL` is not set; callers skip the test.
    pub async fn setup() -> Option<Self> {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set, skipping");
                return None;
            }
        };

        let schema = format!("test_{}", uuid::Uuid::new_v4().simple());

        let admin = db::create_pool(&url, 2).unwrap();
        admin
            .get()
            .await
            .unwrap()
            .batch_execute(&format!("CREATE SCHEMA {}", schema))
            .await
            .unwrap();

        let mut cfg = db::pool_config(&url, 8).unwrap();
        cfg.options = Some(format!("-c search_path={}", schema));
        let pool = db::build_pool(cfg).unwrap();
        db::run_migrations(&pool).await.unwrap();

        Some(Self { pool, admin, schema })
    }

    pub async fn teardown(self) {
        self.pool.close();
        let _ = self
            .admin
            .get()
            .await
            .unwrap()
            .batch_execute(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .await;
    }

    pub async fn create_user(&self, username: &str) -> User {
        let client = self.pool.get().await.unwrap();
        let hash = hash_password(PASSWORD).unwrap();
        user_repo::create_user(&client, username, &format!("{}@example.com", username), &hash)
            .await
            .unwrap()
    }

    pub async fn create_admin(&self, username: &str) -> User {
        let user = self.create_user(username).await;
        self.exec(&format!("UPDATE users SET is_admin = true WHERE id = {}", user.id))
            .await;
        self.user(user.id).await.unwrap()
    }

    pub async fn user(&self, user_id: i64) -> Option<User> {
        let client = self.pool.get().await.unwrap();
        user_repo::find_by_id(&client, user_id).await.unwrap()
    }

    pub async fn exec(&self, sql: &str) {
        self.pool.get().await.unwrap().batch_execute(sql).await.unwrap();
    }

    pub async fn set_schedule(&self, user_id: i64, status: &str, date: NaiveDate) {
        self.exec(&format!(
            "UPDATE users SET status = '{}', deletion_schedule_date = '{}' WHERE id = {}",
            status, date, user_id
        ))
        .await;
    }

    pub async fn count(&self, sql: &str) -> i64 {
        let client = self.pool.get().await.unwrap();
        client.query_one(sql, &[]).await.unwrap().get(0)
    }

    pub async fn live_tokens(&self, user_id: i64) -> i64 {
        self.count(&format!(
            "SELECT COUNT(*) FROM tokens WHERE user_id = {} AND invalidated = false",
            user_id
        ))
        .await
    }

    pub async fn open_sessions(&self, user_id: i64) -> i64 {
        self.count(&format!(
            "SELECT COUNT(*) FROM sessions WHERE user_id = {} AND end_time IS NULL",
            user_id
        ))
        .await
    }
}

pub fn config() -> Config {
    Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused@localhost/unused".to_string()),
        _ => None,
    })
    .unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at_noon(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(12, 0, 0).unwrap().and_utc()
}
