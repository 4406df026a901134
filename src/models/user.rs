use chrono::{DateTime, NaiveDate, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use crate::error::AppError;

/// Lifecycle state of an account (`users.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "account_status")]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[postgres(name = "active")]
    Active,
    #[postgres(name = "suspended")]
    Suspended,
    #[postgres(name = "deactivated")]
    Deactivated,
    #[postgres(name = "to_be_deleted")]
    ToBeDeleted,
}

impl AccountStatus {
    /// Whether the status carries a deletion schedule date.
    pub fn is_scheduled(self) -> bool {
        matches!(self, AccountStatus::Suspended | AccountStatus::ToBeDeleted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Deactivated => "deactivated",
            AccountStatus::ToBeDeleted => "to_be_deleted",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a user in the system.
///
/// Deliberately not `Serialize`: the password hash must never leave the
/// process. Use [`PublicUser`] or [`DeletionCandidate`] for responses.
#[derive(Clone, Debug)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub image: Option<String>,
    pub is_admin: bool,
    pub is_verified: bool,
    pub holiday_mode: bool,
    pub status: AccountStatus,
    /// Set iff `status` is `suspended` or `to_be_deleted`.
    pub deletion_schedule_date: Option<NaiveDate>,
    pub follower_count: i32,
    pub following_count: i32,
    pub seller_rating: Option<f64>,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&Row> for User {
    type Error = AppError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            image: row.try_get("image")?,
            is_admin: row.try_get("is_admin")?,
            is_verified: row.try_get("is_verified")?,
            holiday_mode: row.try_get("holiday_mode")?,
            status: row.try_get("status")?,
            deletion_schedule_date: row.try_get("deletion_schedule_date")?,
            follower_count: row.try_get("follower_count")?,
            following_count: row.try_get("following_count")?,
            seller_rating: row.try_get("seller_rating")?,
            review_count: row.try_get("review_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// The account as shown to its owner.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub image: Option<String>,
    pub is_admin: bool,
    pub is_verified: bool,
    pub holiday_mode: bool,
    pub status: AccountStatus,
    pub deletion_schedule_date: Option<NaiveDate>,
    pub follower_count: i32,
    pub following_count: i32,
    pub seller_rating: Option<f64>,
    pub review_count: i32,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            is_admin: user.is_admin,
            is_verified: user.is_verified,
            holiday_mode: user.holiday_mode,
            status: user.status,
            deletion_schedule_date: user.deletion_schedule_date,
            follower_count: user.follower_count,
            following_count: user.following_count,
            seller_rating: user.seller_rating,
            review_count: user.review_count,
        }
    }
}

/// Minimal projection returned to admins listing accounts due for deletion.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionCandidate {
    pub id: i64,
    pub username: String,
    pub image: Option<String>,
    pub deletion_schedule_date: NaiveDate,
}

impl TryFrom<&Row> for DeletionCandidate {
    type Error = AppError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            image: row.try_get("image")?,
            deletion_schedule_date: row.try_get("deletion_schedule_date")?,
        })
    }
}
