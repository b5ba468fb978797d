use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::ConfigV1;

/// Short-lived cookie holding the nonce of an in-progress OAuth login.
pub const OAUTH_STATE_COOKIE: &str = "todotron.oauth-state";
const OAUTH_STATE_MAX_AGE_SECS: i64 = 10 * 60;

/// Reads the session token from the session cookie, falling back to
/// `Authorization: Bearer <token>`.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| bearer_token(headers))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn base_cookie(name: String, value: String, config: &ConfigV1, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies())
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

pub fn session_cookie(config: &ConfigV1, token: String) -> Cookie<'static> {
    base_cookie(
        config.session.cookie_name.clone(),
        token,
        config,
        config.session.max_age_in_secs,
    )
}

/// An expired session cookie; adding it to a jar deletes the client's copy.
pub fn cleared_session_cookie(config: &ConfigV1) -> Cookie<'static> {
    base_cookie(config.session.cookie_name.clone(), String::new(), config, 0)
}

pub fn oauth_state_cookie(config: &ConfigV1, nonce: String) -> Cookie<'static> {
    base_cookie(
        OAUTH_STATE_COOKIE.to_string(),
        nonce,
        config,
        OAUTH_STATE_MAX_AGE_SECS,
    )
}

pub fn cleared_oauth_state_cookie(config: &ConfigV1) -> Cookie<'static> {
    base_cookie(OAUTH_STATE_COOKIE.to_string(), String::new(), config, 0)
}
