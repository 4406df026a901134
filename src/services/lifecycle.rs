//! Account lifecycle state machine.
//!
//! Every write to `users.status` and `users.deletion_schedule_date` goes
//! through this module. The `plan_*` functions are pure and decide whether a
//! move is allowed and what it writes; the async functions lock the user row,
//! plan, write and commit in one transaction.
//!
//! ```text
//!            admin toggle                 request deletion
//!   suspended <----------> active ----------------------> to_be_deleted
//!       |      (>= today+3)  |  <----------------------        |
//!       | sweeper, date<=today|       cancel deletion          | admin delete,
//!       +------> active       | deactivate                     | date<=today
//!                             v                                v
//!                        deactivated                        (removed)
//! ```

use chrono::{DateTime, Duration, NaiveDate, Utc};
use deadpool_postgres::Pool;

use crate::{
    error::{AppError, Result},
    models::user::{AccountStatus, User},
    repositories::user as user_repo,
    services::tokens,
};

/// Minimum number of days a suspension lasts.
pub const SUSPENSION_FLOOR_DAYS: i64 = 3;

/// Result of an admin suspension toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionToggle {
    Suspend { until: NaiveDate },
    Unsuspend,
}

/// Status and schedule of an account after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LifecycleState {
    pub status: AccountStatus,
    pub deletion_schedule_date: Option<NaiveDate>,
}

impl From<SuspensionToggle> for LifecycleState {
    fn from(toggle: SuspensionToggle) -> Self {
        match toggle {
            SuspensionToggle::Suspend { until } => Self {
                status: AccountStatus::Suspended,
                deletion_schedule_date: Some(until),
            },
            SuspensionToggle::Unsuspend => Self {
                status: AccountStatus::Active,
                deletion_schedule_date: None,
            },
        }
    }
}

/// The schedule date must be present exactly when the status is
/// `suspended` or `to_be_deleted`.
pub fn schedule_is_consistent(status: AccountStatus, date: Option<NaiveDate>) -> bool {
    status.is_scheduled() == date.is_some()
}

/// Date a suspension ends: the requested date, but never before `today + 3`.
pub fn suspension_until(requested: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    let floor = today + Duration::days(SUSPENSION_FLOOR_DAYS);
    match requested {
        Some(date) if date > floor => date,
        _ => floor,
    }
}

fn ensure_not_admin(user: &User) -> Result<()> {
    if user.is_admin {
        return Err(AppError::Forbidden(
            "Admin accounts cannot be moderated".to_string(),
        ));
    }
    Ok(())
}

/// Decides the direction of the admin suspension toggle.
pub fn plan_suspension_toggle(
    user: &User,
    requested: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<SuspensionToggle> {
    ensure_not_admin(user)?;

    match user.status {
        AccountStatus::Active => Ok(SuspensionToggle::Suspend {
            until: suspension_until(requested, today),
        }),
        AccountStatus::Suspended => Ok(SuspensionToggle::Unsuspend),
        AccountStatus::ToBeDeleted => Err(AppError::InvalidTransition(
            "Account is scheduled for deletion and cannot be suspended".to_string(),
        )),
        AccountStatus::Deactivated => Err(AppError::InvalidTransition(
            "Account is deactivated and cannot be suspended".to_string(),
        )),
    }
}

/// Checks that an account may be permanently removed today.
pub fn ensure_deletable(user: &User, today: NaiveDate) -> Result<()> {
    ensure_not_admin(user)?;

    if user.status != AccountStatus::ToBeDeleted {
        return Err(AppError::InvalidTransition(format!(
            "Account is {} and not scheduled for deletion",
            user.status
        )));
    }

    match user.deletion_schedule_date {
        Some(date) if date <= today => Ok(()),
        Some(date) => Err(AppError::InvalidTransition(format!(
            "Account cannot be deleted before {}",
            date
        ))),
        None => Err(AppError::InvalidTransition(
            "Account has no deletion date".to_string(),
        )),
    }
}

/// Decides the date a user-requested deletion becomes executable.
pub fn plan_deletion_request(user: &User, today: NaiveDate, grace_days: i64) -> Result<NaiveDate> {
    if user.is_admin {
        return Err(AppError::Forbidden(
            "Admin accounts cannot be scheduled for deletion".to_string(),
        ));
    }
    if user.status != AccountStatus::Active {
        return Err(AppError::InvalidTransition(format!(
            "Account is {} and cannot request deletion",
            user.status
        )));
    }
    Ok(today + Duration::days(grace_days.max(0)))
}

pub fn plan_deletion_cancel(user: &User) -> Result<()> {
    if user.status != AccountStatus::ToBeDeleted {
        return Err(AppError::InvalidTransition(
            "Account is not scheduled for deletion".to_string(),
        ));
    }
    Ok(())
}

pub fn plan_deactivation(user: &User) -> Result<()> {
    if user.status != AccountStatus::Active {
        return Err(AppError::InvalidTransition(format!(
            "Account is {} and cannot be deactivated",
            user.status
        )));
    }
    Ok(())
}

async fn write_state<C: deadpool_postgres::GenericClient>(
    client: &C,
    user_id: i64,
    state: LifecycleState,
) -> Result<()> {
    debug_assert!(schedule_is_consistent(state.status, state.deletion_schedule_date));
    user_repo::set_status(client, user_id, state.status, state.deletion_schedule_date).await
}

/// Admin toggle: suspends an active account or lifts an existing suspension.
///
/// Suspending also ends every session of the target.
pub async fn toggle_suspension(
    pool: &Pool,
    user_id: i64,
    requested: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<LifecycleState> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let user = user_repo::lock_by_id(&tx, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let toggle = match plan_suspension_toggle(&user, requested, now.date_naive()) {
        Ok(toggle) => toggle,
        Err(e) => {
            tx.rollback().await?;
            return Err(e);
        }
    };

    let state = LifecycleState::from(toggle);
    write_state(&tx, user_id, state).await?;

    if let SuspensionToggle::Suspend { .. } = toggle {
        tokens::revoke_all_for_user(&tx, user_id, now).await?;
    }

    tx.commit().await?;

    match toggle {
        SuspensionToggle::Suspend { until } => {
            tracing::info!("⛔ User {} suspended until {}", user_id, until)
        }
        SuspensionToggle::Unsuspend => tracing::info!("✅ User {} unsuspended", user_id),
    }

    Ok(state)
}

/// Reactivates every suspended account whose date is on or before `today`.
///
/// One transaction for the whole batch. Returns the reactivated IDs.
pub async fn reactivate_elapsed_suspensions(pool: &Pool, today: NaiveDate) -> Result<Vec<i64>> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;
    let reactivated = user_repo::reactivate_elapsed_suspensions(&tx, today).await?;
    tx.commit().await?;
    Ok(reactivated)
}

/// Permanently removes an account scheduled for deletion.
pub async fn delete_account(pool: &Pool, user_id: i64, today: NaiveDate) -> Result<()> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let user = user_repo::lock_by_id(&tx, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Err(e) = ensure_deletable(&user, today) {
        tx.rollback().await?;
        return Err(e);
    }

    // Sessions and tokens go first so the cascade never locks a token before
    // its session.
    tokens::revoke_all_for_user(&tx, user_id, Utc::now()).await?;
    user_repo::delete_user(&tx, user_id).await?;
    tx.commit().await?;

    tracing::info!("🗑️ User {} permanently deleted", user_id);
    Ok(())
}

/// The owner asks for their account to be deleted after the grace period.
///
/// All sessions end immediately.
pub async fn request_deletion(
    pool: &Pool,
    user_id: i64,
    grace_days: i64,
    now: DateTime<Utc>,
) -> Result<LifecycleState> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let user = user_repo::lock_by_id(&tx, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let date = match plan_deletion_request(&user, now.date_naive(), grace_days) {
        Ok(date) => date,
        Err(e) => {
            tx.rollback().await?;
            return Err(e);
        }
    };

    let state = LifecycleState {
        status: AccountStatus::ToBeDeleted,
        deletion_schedule_date: Some(date),
    };
    write_state(&tx, user_id, state).await?;
    tokens::revoke_all_for_user(&tx, user_id, now).await?;
    tx.commit().await?;

    tracing::info!("📅 User {} scheduled for deletion on {}", user_id, date);
    Ok(state)
}

/// The owner withdraws a pending deletion request.
pub async fn cancel_deletion(pool: &Pool, user_id: i64) -> Result<LifecycleState> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let user = user_repo::lock_by_id(&tx, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Err(e) = plan_deletion_cancel(&user) {
        tx.rollback().await?;
        return Err(e);
    }

    let state = LifecycleState {
        status: AccountStatus::Active,
        deletion_schedule_date: None,
    };
    write_state(&tx, user_id, state).await?;
    tx.commit().await?;

    tracing::info!("✅ User {} cancelled their deletion request", user_id);
    Ok(state)
}

/// The owner deactivates their account. Terminal; all sessions end.
pub async fn deactivate(pool: &Pool, user_id: i64, now: DateTime<Utc>) -> Result<LifecycleState> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let user = user_repo::lock_by_id(&tx, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Err(e) = plan_deactivation(&user) {
        tx.rollback().await?;
        return Err(e);
    }

    let state = LifecycleState {
        status: AccountStatus::Deactivated,
        deletion_schedule_date: None,
    };
    write_state(&tx, user_id, state).await?;
    tokens::revoke_all_for_user(&tx, user_id, now).await?;
    tx.commit().await?;

    tracing::info!("👋 User {} deactivated their account", user_id);
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn user(status: AccountStatus, date: Option<NaiveDate>, is_admin: bool) -> User {
        User {
            id: 7,
            username: "reader".into(),
            email: "reader@example.com".into(),
            password_hash: String::new(),
            image: None,
            is_admin,
            is_verified: true,
            holiday_mode: false,
            status,
            deletion_schedule_date: date,
            follower_count: 0,
            following_count: 0,
            seller_rating: None,
            review_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Applies a planned toggle the way `toggle_suspension` persists it.
    fn apply(user: &mut User, toggle: SuspensionToggle) {
        let state = LifecycleState::from(toggle);
        user.status = state.status;
        user.deletion_schedule_date = state.deletion_schedule_date;
    }

    #[test]
    fn suspension_without_date_lasts_three_days() {
        let today = day(2024, 3, 10);
        let target = user(AccountStatus::Active, None, false);
        assert_eq!(
            plan_suspension_toggle(&target, None, today).unwrap(),
            SuspensionToggle::Suspend { until: day(2024, 3, 13) }
        );
    }

    #[test]
    fn early_dates_are_clamped_to_the_floor() {
        let today = day(2024, 3, 10);
        for requested in [day(2024, 3, 1), day(2024, 3, 10), day(2024, 3, 12), day(2024, 3, 13)] {
            assert_eq!(suspension_until(Some(requested), today), day(2024, 3, 13));
        }
        assert_eq!(suspension_until(Some(day(2024, 4, 1)), today), day(2024, 4, 1));
    }

    #[test]
    fn toggling_twice_returns_to_active() {
        let today = day(2024, 3, 10);
        let mut target = user(AccountStatus::Active, None, false);

        let first = plan_suspension_toggle(&target, Some(day(2024, 5, 1)), today).unwrap();
        apply(&mut target, first);
        assert_eq!(target.status, AccountStatus::Suspended);
        assert_eq!(target.deletion_schedule_date, Some(day(2024, 5, 1)));

        let second = plan_suspension_toggle(&target, None, today).unwrap();
        assert_eq!(second, SuspensionToggle::Unsuspend);
        apply(&mut target, second);
        assert_eq!(target.status, AccountStatus::Active);
        assert_eq!(target.deletion_schedule_date, None);
    }

    #[test]
    fn admins_are_never_moderated() {
        let today = day(2024, 3, 10);
        let admin = user(AccountStatus::Active, None, true);
        assert!(matches!(
            plan_suspension_toggle(&admin, None, today),
            Err(AppError::Forbidden(_))
        ));

        let scheduled_admin = user(AccountStatus::ToBeDeleted, Some(day(2024, 1, 1)), true);
        assert!(matches!(
            ensure_deletable(&scheduled_admin, today),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            plan_deletion_request(&admin, today, 30),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn accounts_pending_deletion_cannot_be_suspended() {
        let today = day(2024, 3, 10);
        let pending = user(AccountStatus::ToBeDeleted, Some(day(2024, 4, 1)), false);
        assert!(matches!(
            plan_suspension_toggle(&pending, None, today),
            Err(AppError::InvalidTransition(_))
        ));

        let deactivated = user(AccountStatus::Deactivated, None, false);
        assert!(matches!(
            plan_suspension_toggle(&deactivated, None, today),
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[test]
    fn deletion_requires_elapsed_schedule() {
        let today = day(2024, 3, 10);

        let active = user(AccountStatus::Active, None, false);
        assert!(matches!(
            ensure_deletable(&active, today),
            Err(AppError::InvalidTransition(_))
        ));

        let early = user(AccountStatus::ToBeDeleted, Some(day(2024, 3, 11)), false);
        assert!(matches!(
            ensure_deletable(&early, today),
            Err(AppError::InvalidTransition(_))
        ));

        let due_today = user(AccountStatus::ToBeDeleted, Some(today), false);
        assert!(ensure_deletable(&due_today, today).is_ok());

        let overdue = user(AccountStatus::ToBeDeleted, Some(day(2024, 2, 1)), false);
        assert!(ensure_deletable(&overdue, today).is_ok());
    }

    #[test]
    fn user_initiated_transitions() {
        let today = day(2024, 3, 10);
        let active = user(AccountStatus::Active, None, false);
        assert_eq!(plan_deletion_request(&active, today, 30).unwrap(), day(2024, 4, 9));
        assert!(plan_deactivation(&active).is_ok());
        assert!(plan_deletion_cancel(&active).is_err());

        let suspended = user(AccountStatus::Suspended, Some(day(2024, 3, 13)), false);
        assert!(plan_deletion_request(&suspended, today, 30).is_err());
        assert!(plan_deactivation(&suspended).is_err());

        let pending = user(AccountStatus::ToBeDeleted, Some(day(2024, 4, 9)), false);
        assert!(plan_deletion_cancel(&pending).is_ok());
    }

    #[test]
    fn every_planned_state_is_consistent() {
        let today = day(2024, 3, 10);
        let target = user(AccountStatus::Active, None, false);
        let suspend = LifecycleState::from(plan_suspension_toggle(&target, None, today).unwrap());
        assert!(schedule_is_consistent(suspend.status, suspend.deletion_schedule_date));
        let lift = LifecycleState::from(SuspensionToggle::Unsuspend);
        assert!(schedule_is_consistent(lift.status, lift.deletion_schedule_date));

        assert!(!schedule_is_consistent(AccountStatus::Suspended, None));
        assert!(!schedule_is_consistent(AccountStatus::Active, Some(today)));
        assert!(!schedule_is_consistent(AccountStatus::Deactivated, Some(today)));
        assert!(schedule_is_consistent(AccountStatus::ToBeDeleted, Some(today)));
    }
}
