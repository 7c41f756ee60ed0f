use axum::http::HeaderMap;
use axum_extra::headers::{Cookie, HeaderMapExt};

use crate::config::{Environment, JwtConfig};

pub const COOKIE_NAME: &str = "jwt";
const LOGGED_OUT: &str = "loggedout";

/// `Set-Cookie` value carrying the token; script access is disabled and the
/// cookie is HTTPS-only in production.
pub fn auth_cookie(token: &str, jwt: &JwtConfig, env: Environment) -> String {
    let max_age = jwt.cookie_expires_in_days.saturating_mul(24 * 60 * 60);
    let mut cookie =
        format!("{COOKIE_NAME}={token}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax");
    if env.is_production() {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Overwrites the token with a placeholder that expires almost immediately.
pub fn logout_cookie(env: Environment) -> String {
    let mut cookie = format!("{COOKIE_NAME}={LOGGED_OUT}; Max-Age=10; Path=/; HttpOnly; SameSite=Lax");
    if env.is_production() {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn token_from_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie = headers.typed_get::<Cookie>()?;
    cookie
        .get(COOKIE_NAME)
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != LOGGED_OUT)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};
    use std::time::Duration;

    fn jwt() -> JwtConfig {
        JwtConfig {
            secret: "s".into(),
            expires_in: Duration::from_secs(60),
            cookie_expires_in_days: 2,
        }
    }

    #[test]
    fn cookie_is_http_only_and_secure_in_production() {
        let dev = auth_cookie("abc", &jwt(), Environment::Development);
        assert!(dev.starts_with("jwt=abc;"));
        assert!(dev.contains("HttpOnly"));
        assert!(dev.contains("Max-Age=172800"));
        assert!(!dev.contains("Secure"));

        let prod = auth_cookie("abc", &jwt(), Environment::Production);
        assert!(prod.ends_with("; Secure"));
    }

    #[test]
    fn huge_cookie_lifetime_does_not_overflow() {
        let jwt = JwtConfig {
            cookie_expires_in_days: u64::MAX / 1000,
            ..jwt()
        };
        let cookie = auth_cookie("abc", &jwt, Environment::Development);
        assert!(cookie.contains(&format!("Max-Age={}", u64::MAX)));
    }

    #[test]
    fn reads_token_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; jwt=tok.en.value; lang=en"),
        );
        assert_eq!(token_from_cookie(&headers).as_deref(), Some("tok.en.value"));
    }

    #[test]
    fn logged_out_cookie_counts_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("jwt=loggedout"));
        assert_eq!(token_from_cookie(&headers), None);
        assert_eq!(token_from_cookie(&HeaderMap::new()), None);
    }

    #[test]
    fn ignores_similarly_named_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("xjwt=nope; jwt_old=nope"));
        assert_eq!(token_from_cookie(&headers), None);
    }
}
