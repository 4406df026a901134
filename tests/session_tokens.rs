mod common;

use bookswap_accounts::{
    error::AppError,
    mailer::MemoryMailer,
    models::user::AccountStatus,
    services::{auth, tokens},
};
use chrono::Duration;
use common::{at_noon, config, day, TestDb, PASSWORD};

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() {
    let Some(db) = TestDb::setup().await else { return };
    let reader = db.create_user("reader").await;
    let settings = config().tokens;
    let now = at_noon(day(2024, 3, 10));

    let first = tokens::open_session(&db.pool, &settings, reader.id, None, None, now)
        .await
        .unwrap();

    let later = now + Duration::minutes(20);
    let second = tokens::refresh_session(&db.pool, &settings, Some(&first.refresh.token), later)
        .await
        .unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_ne!(second.refresh.token, first.refresh.token);
    assert_eq!(second.access.expires_at, later + settings.access_ttl);
    assert_eq!(second.refresh.expires_at, later + settings.refresh_ttl);

    let err = tokens::refresh_session(&db.pool, &settings, Some(&first.refresh.token), later)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));

    // The replay leaves the rotated token usable.
    tokens::refresh_session(&db.pool, &settings, Some(&second.refresh.token), later)
        .await
        .unwrap();

    db.teardown().await;
}

#[tokio::test]
async fn concurrent_refreshes_with_one_token_yield_one_winner() {
    let Some(db) = TestDb::setup().await else { return };
    let reader = db.create_user("reader").await;
    let settings = config().tokens;
    let now = at_noon(day(2024, 3, 10));

    let pair = tokens::open_session(&db.pool, &settings, reader.id, None, None, now)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        tokens::refresh_session(&db.pool, &settings, Some(&pair.refresh.token), now),
        tokens::refresh_session(&db.pool, &settings, Some(&pair.refresh.token), now),
    );
    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let failure = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(failure, AppError::InvalidToken));

    db.teardown().await;
}

#[tokio::test]
async fn missing_unknown_and_expired_refresh_tokens() {
    let Some(db) = TestDb::setup().await else { return };
    let reader = db.create_user("reader").await;
    let settings = config().tokens;
    let now = at_noon(day(2024, 3, 10));

    let err = tokens::refresh_session(&db.pool, &settings, None, now).await.unwrap_err();
    assert!(matches!(err, AppError::MissingToken));
    let err = tokens::refresh_session(&db.pool, &settings, Some(""), now).await.unwrap_err();
    assert!(matches!(err, AppError::MissingToken));

    let err = tokens::refresh_session(&db.pool, &settings, Some("no-such-token"), now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));

    let pair = tokens::open_session(&db.pool, &settings, reader.id, None, None, now)
        .await
        .unwrap();
    let err = tokens::refresh_session(&db.pool, &settings, Some(&pair.access.token), now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidToken), "access tokens cannot refresh");

    let expired_at = pair.refresh.expires_at;
    let err = tokens::refresh_session(&db.pool, &settings, Some(&pair.refresh.token), expired_at)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));

    db.teardown().await;
}

#[tokio::test]
async fn global_logout_with_zero_one_and_many_sessions() {
    let Some(db) = TestDb::setup().await else { return };
    let settings = config().tokens;
    let now = at_noon(day(2024, 3, 10));

    for (name, sessions) in [("none", 0u64), ("single", 1), ("many", 4)] {
        let user = db.create_user(name).await;
        for _ in 0..sessions {
            tokens::open_session(&db.pool, &settings, user.id, None, None, now)
                .await
                .unwrap();
        }

        let summary = tokens::global_logout(&db.pool, user.id, now).await.unwrap();
        assert_eq!(summary.sessions_ended, sessions);
        assert_eq!(summary.tokens_invalidated, sessions * 2);
        assert_eq!(db.open_sessions(user.id).await, 0);
        assert_eq!(db.live_tokens(user.id).await, 0);
    }

    db.teardown().await;
}

#[tokio::test]
async fn global_logout_leaves_other_users_alone() {
    let Some(db) = TestDb::setup().await else { return };
    let settings = config().tokens;
    let now = at_noon(day(2024, 3, 10));
    let alice = db.create_user("alice").await;
    let bob = db.create_user("bob").await;

    tokens::open_session(&db.pool, &settings, alice.id, None, None, now).await.unwrap();
    let bobs = tokens::open_session(&db.pool, &settings, bob.id, None, None, now).await.unwrap();

    tokens::global_logout(&db.pool, alice.id, now).await.unwrap();

    assert_eq!(db.open_sessions(bob.id).await, 1);
    tokens::authenticate(&db.pool, &bobs.access.token, now).await.unwrap();

    db.teardown().await;
}

#[tokio::test]
async fn single_logout_ends_only_that_session() {
    let Some(db) = TestDb::setup().await else { return };
    let settings = config().tokens;
    let now = at_noon(day(2024, 3, 10));
    let reader = db.create_user("reader").await;

    let phone = tokens::open_session(&db.pool, &settings, reader.id, None, Some("phone"), now)
        .await
        .unwrap();
    let laptop = tokens::open_session(&db.pool, &settings, reader.id, None, Some("laptop"), now)
        .await
        .unwrap();

    let summary = tokens::logout(&db.pool, phone.session_id, now).await.unwrap();
    assert_eq!(summary.sessions_ended, 1);
    assert_eq!(summary.tokens_invalidated, 2);

    let err = tokens::authenticate(&db.pool, &phone.access.token, now).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));
    let (auth_user, _) = tokens::authenticate(&db.pool, &laptop.access.token, now).await.unwrap();
    assert_eq!(auth_user.session_id, laptop.session_id);

    db.teardown().await;
}

#[tokio::test]
async fn password_change_logs_out_everywhere() {
    let Some(db) = TestDb::setup().await else { return };
    let cfg = config();
    let now = at_noon(day(2024, 3, 10));
    let reader = db.create_user("reader").await;

    for _ in 0..3 {
        tokens::open_session(&db.pool, &cfg.tokens, reader.id, None, None, now).await.unwrap();
    }

    let err = auth::change_password(&db.pool, reader.id, "wrong-password1", "newshelf99", now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));
    assert_eq!(db.open_sessions(reader.id).await, 3);

    let summary = auth::change_password(&db.pool, reader.id, PASSWORD, "newshelf99", now)
        .await
        .unwrap();
    assert_eq!(summary.sessions_ended, 3);
    assert_eq!(db.open_sessions(reader.id).await, 0);
    assert_eq!(db.live_tokens(reader.id).await, 0);

    let err = auth::login(&db.pool, &cfg, "reader", PASSWORD, None, None, now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));
    auth::login(&db.pool, &cfg, "reader", "newshelf99", None, None, now)
        .await
        .unwrap();

    db.teardown().await;
}

#[tokio::test]
async fn registration_and_email_confirmation() {
    let Some(db) = TestDb::setup().await else { return };
    let cfg = config();
    let mailer = MemoryMailer::new();
    let now = at_noon(day(2024, 3, 10));

    let user = auth::register(&db.pool, &cfg, &mailer, "newreader", "New@Example.com", PASSWORD, now)
        .await
        .unwrap();
    assert_eq!(user.email, "new@example.com");
    assert_eq!(user.status, AccountStatus::Active);
    assert!(!user.is_verified);

    let err = auth::register(&db.pool, &cfg, &mailer, "newreader", "other@example.com", PASSWORD, now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let first = mailer.last_token_for("new@example.com").unwrap();
    auth::resend_confirmation(&db.pool, &cfg, &mailer, user.id, now).await.unwrap();
    let second = mailer.last_token_for("new@example.com").unwrap();
    assert_ne!(first, second);

    let err = auth::confirm_email(&db.pool, &first, now).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidToken), "superseded link is dead");

    auth::confirm_email(&db.pool, &second, now).await.unwrap();
    assert!(db.user(user.id).await.unwrap().is_verified);

    let err = auth::confirm_email(&db.pool, &second, now).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidToken), "links are single use");

    db.teardown().await;
}

#[tokio::test]
async fn password_reset_flow() {
    let Some(db) = TestDb::setup().await else { return };
    let cfg = config();
    let mailer = MemoryMailer::new();
    let now = at_noon(day(2024, 3, 10));
    let reader = db.create_user("reader").await;
    tokens::open_session(&db.pool, &cfg.tokens, reader.id, None, None, now).await.unwrap();

    auth::request_password_reset(&db.pool, &cfg, &mailer, "nobody@example.com", now)
        .await
        .unwrap();
    assert!(mailer.sent().is_empty());

    auth::request_password_reset(&db.pool, &cfg, &mailer, "Reader@example.com", now)
        .await
        .unwrap();
    let token = mailer.last_token_for("reader@example.com").unwrap();

    let too_late = now + cfg.tokens.password_reset_ttl;
    let err = auth::reset_password(&db.pool, &token, "freshpage7", too_late)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));

    let summary = auth::reset_password(&db.pool, &token, "freshpage7", now).await.unwrap();
    assert_eq!(summary.sessions_ended, 1);
    assert_eq!(db.open_sessions(reader.id).await, 0);

    auth::login(&db.pool, &cfg, "reader", "freshpage7", None, None, now)
        .await
        .unwrap();

    db.teardown().await;
}

#[tokio::test]
async fn access_tokens_expire_and_only_access_tokens_authorize() {
    let Some(db) = TestDb::setup().await else { return };
    let settings = config().tokens;
    let now = at_noon(day(2024, 3, 10));
    let reader = db.create_user("reader").await;

    let pair = tokens::open_session(&db.pool, &settings, reader.id, Some("127.0.0.1"), None, now)
        .await
        .unwrap();
    let (auth_user, user) = tokens::authenticate(&db.pool, &pair.access.token, now).await.unwrap();
    assert_eq!(auth_user.user_id, reader.id);
    assert!(!auth_user.is_admin);
    assert_eq!(user.username, "reader");

    let err = tokens::authenticate(&db.pool, &pair.access.token, pair.access.expires_at)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));

    let err = tokens::authenticate(&db.pool, &pair.refresh.token, now).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidToken), "refresh tokens do not authorize calls");

    db.teardown().await;
}

#[tokio::test]
async fn refresh_racing_global_logout_never_deadlocks() {
    let Some(db) = TestDb::setup().await else { return };
    let reader = db.create_user("reader").await;
    let settings = config().tokens;
    let now = at_noon(day(2024, 3, 10));

    for _ in 0..50 {
        let pair = tokens::open_session(&db.pool, &settings, reader.id, None, None, now)
            .await
            .unwrap();

        let (refreshed, logout) = tokio::join!(
            tokens::refresh_session(&db.pool, &settings, Some(&pair.refresh.token), now),
            tokens::global_logout(&db.pool, reader.id, now),
        );
        match refreshed {
            Ok(_) | Err(AppError::InvalidToken) => {}
            Err(e) => panic!("refresh failed: {e:?}"),
        }
        if let Err(e) = logout {
            panic!("global logout failed: {e:?}");
        }
        assert_eq!(db.live_tokens(reader.id).await, 0);
        assert_eq!(db.open_sessions(reader.id).await, 0);
    }

    db.teardown().await;
}

#[tokio::test]
async fn failed_global_logout_leaves_everything_live() {
    let Some(db) = TestDb::setup().await else { return };
    let reader = db.create_user("reader").await;
    let settings = config().tokens;
    let now = at_noon(day(2024, 3, 10));

    for _ in 0..2 {
        tokens::open_session(&db.pool, &settings, reader.id, None, None, now)
            .await
            .unwrap();
    }
    db.exec(
        "CREATE FUNCTION reject_update() RETURNS trigger AS $$ \
         BEGIN RAISE EXCEPTION 'token update rejected'; END $$ LANGUAGE plpgsql; \
         CREATE TRIGGER reject_token_update BEFORE UPDATE ON tokens \
         FOR EACH ROW EXECUTE FUNCTION reject_update();",
    )
    .await;

    // Sessions are ended before tokens, so the failure hits the second write.
    let result = tokens::global_logout(&db.pool, reader.id, now).await;
    assert!(result.is_err());
    assert_eq!(db.open_sessions(reader.id).await, 2);
    assert_eq!(db.live_tokens(reader.id).await, 4);

    db.exec("DROP TRIGGER reject_token_update ON tokens;").await;
    let summary = tokens::global_logout(&db.pool, reader.id, now).await.unwrap();
    assert_eq!(summary.sessions_ended, 2);
    assert_eq!(summary.tokens_invalidated, 4);

    db.teardown().await;
}
