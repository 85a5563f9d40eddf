//! Session cookies: the refresh token always travels in an httpOnly cookie.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::AppEnv;

/// Cookie holding the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";
/// Cookie the auth gate checks before the Authorization header.
pub const ACCESS_COOKIE: &str = "accessToken";

fn base(value: String, env: AppEnv) -> Cookie<'static> {
    let same_site = if env.is_production() {
        SameSite::None
    } else {
        SameSite::Strict
    };
    Cookie::build((REFRESH_COOKIE, value))
        .http_only(true)
        .secure(env.is_production())
        .same_site(same_site)
        .path("/")
        .build()
}

/// Refresh cookie whose lifetime matches the refresh token's TTL.
pub fn refresh_cookie(token: &str, max_age: Duration, env: AppEnv) -> Cookie<'static> {
    let mut cookie = base(token.to_owned(), env);
    cookie.set_max_age(max_age);
    cookie
}

/// Same attributes, empty value, zero max-age: browsers drop it.
pub fn clear_refresh_cookie(env: AppEnv) -> Cookie<'static> {
    let mut cookie = base(String::new(), env);
    cookie.set_max_age(Duration::ZERO);
    cookie
}
