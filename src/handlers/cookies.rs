use chrono::{DateTime, Utc};
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::models::token::TokenPair;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// HttpOnly, SameSite=Lax cookie on `/`, `Secure` in production.
pub fn create_secure_cookie(
    name: &'static str,
    value: String,
    max_age_secs: i64,
    production: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    if production {
        cookie.set_secure(true);
    }
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::seconds(max_age_secs.max(0)));
    cookie.set_path("/");
    cookie
}

fn seconds_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds()
}

/// Stores both tokens of a freshly issued pair.
pub fn set_token_cookies(cookies: &Cookies, pair: &TokenPair, production: bool) {
    let now = Utc::now();
    cookies.add(create_secure_cookie(
        ACCESS_COOKIE,
        pair.access.token.clone(),
        seconds_until(pair.access.expires_at, now),
        production,
    ));
    cookies.add(create_secure_cookie(
        REFRESH_COOKIE,
        pair.refresh.token.clone(),
        seconds_until(pair.refresh.expires_at, now),
        production,
    ));
}

pub fn clear_token_cookies(cookies: &Cookies) {
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        let mut cookie = Cookie::new(name, "");
        cookie.set_max_age(Duration::seconds(0));
        cookie.set_path("/");
        cookies.remove(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookies_are_http_only_and_scoped_to_root() {
        let cookie = create_secure_cookie(REFRESH_COOKIE, "abc".into(), 60, true);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(60)));
    }

    #[test]
    fn expired_lifetimes_clamp_to_zero() {
        let cookie = create_secure_cookie(ACCESS_COOKIE, "abc".into(), -5, false);
        assert_eq!(cookie.max_age(), Some(Duration::seconds(0)));
        assert_eq!(cookie.secure(), None);
    }
}
