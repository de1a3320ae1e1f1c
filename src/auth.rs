//! Session authentication
//!
//! A session is authenticated either by replaying an exported cookie jar or,
//! when that is unavailable or fails, by driving the login form with
//! credentials from the environment.

use crate::browser::wait::{wait_for_clickable, wait_for_presence};
use crate::browser::{Cookie, Session};
use crate::config::AppConfig;
use crate::error::AuthError;
use anyhow::Context;
use serde_json::{Map, Value};
use std::path::Path;

pub const USERNAME_ENV: &str = "WEBPT_USERNAME";
pub const PASSWORD_ENV: &str = "WEBPT_PASSWORD";

/// Login credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read `WEBPT_USERNAME`/`WEBPT_PASSWORD`. Empty values count as missing.
    pub fn from_env() -> Option<Self> {
        let username = std::env::var(USERNAME_ENV).ok().filter(|v| !v.is_empty())?;
        let password = std::env::var(PASSWORD_ENV).ok().filter(|v| !v.is_empty())?;
        Some(Self { username, password })
    }
}

/// Adjust a stored cookie for replay: drop `sameSite`, and truncate a
/// fractional `expiry` to whole seconds.
pub fn normalize_cookie(cookie: &mut Map<String, Value>) {
    cookie.remove("sameSite");

    let truncated = cookie
        .get("expiry")
        .filter(|v| v.is_f64())
        .and_then(Value::as_f64)
        .map(|secs| secs.trunc() as i64);
    if let Some(secs) = truncated {
        cookie.insert("expiry".to_string(), Value::from(secs));
    }
}

/// Parse a JSON cookie export (an array of cookie objects)
pub fn parse_cookies(content: &str) -> anyhow::Result<Vec<Cookie>> {
    let raw: Vec<Map<String, Value>> =
        serde_json::from_str(content).context("cookie file is not a JSON array of objects")?;

    raw.into_iter()
        .enumerate()
        .map(|(i, mut cookie)| {
            normalize_cookie(&mut cookie);
            serde_json::from_value(Value::Object(cookie))
                .with_context(|| format!("cookie #{} is invalid", i + 1))
        })
        .collect()
}

pub async fn load_cookies(path: &Path) -> anyhow::Result<Vec<Cookie>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read cookie file {}", path.display()))?;
    parse_cookies(&content)
}

/// Replay the configured cookie file against `base_url`.
///
/// Returns `false` when no cookie file is configured or anything goes wrong;
/// the caller then falls back to a scripted login.
pub async fn apply_cookies_if_available<S: Session + ?Sized>(
    session: &S,
    config: &AppConfig,
) -> bool {
    let Some(cookies_path) = &config.login.cookies_path else {
        return false;
    };

    match replay_cookies(session, config, cookies_path).await {
        Ok(count) => {
            log::info!("🍪 Replayed {} cookies from {}", count, cookies_path.display());
            true
        }
        Err(e) => {
            log::warn!("Cookie replay failed, falling back to login: {:#}", e);
            false
        }
    }
}

async fn replay_cookies<S: Session + ?Sized>(
    session: &S,
    config: &AppConfig,
    cookies_path: &Path,
) -> anyhow::Result<usize> {
    session.navigate(&config.base_url).await?;

    let cookies = load_cookies(cookies_path).await?;
    for cookie in &cookies {
        session
            .add_cookie(cookie)
            .await
            .with_context(|| format!("Failed to set cookie {}", cookie.name))?;
    }

    session.navigate(&config.base_url).await?;
    Ok(cookies.len())
}

/// Drive the login form
pub async fn login_with_credentials<S: Session + ?Sized>(
    session: &S,
    config: &AppConfig,
    credentials: Option<&Credentials>,
) -> Result<(), AuthError> {
    let credentials = credentials.ok_or(AuthError::MissingCredentials)?;
    let login = &config.login;
    let timeout = config.default_timeout;

    log::info!("🔐 Logging in as {}", credentials.username);
    session.navigate(&login.url).await?;

    let username = wait_for_presence(session, &login.username_selector, timeout).await?;
    session.fill(&username, &credentials.username).await?;

    let password = wait_for_presence(session, &login.password_selector, timeout).await?;
    session.fill(&password, &credentials.password).await?;

    let submit = wait_for_clickable(session, &login.submit_selector, timeout).await?;
    session.click(&submit).await?;

    tokio::time::sleep(login.post_login_wait).await;
    Ok(())
}

/// Authenticate the session, preferring cookie replay
pub async fn ensure_authenticated<S: Session + ?Sized>(
    session: &S,
    config: &AppConfig,
    credentials: Option<&Credentials>,
) -> Result<(), AuthError> {
    if apply_cookies_if_available(session, config).await {
        return Ok(());
    }
    login_with_credentials(session, config, credentials).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_strips_same_site_and_truncates_expiry() {
        let mut cookie = json!({
            "name": "session",
            "value": "abc",
            "sameSite": "Lax",
            "expiry": 1999999999.0
        })
        .as_object()
        .cloned()
        .unwrap();

        normalize_cookie(&mut cookie);

        assert!(!cookie.contains_key("sameSite"));
        assert_eq!(cookie["expiry"], json!(1999999999));
        assert!(cookie["expiry"].is_i64());
    }

    #[test]
    fn test_normalize_keeps_integer_expiry() {
        let mut cookie = json!({"name": "a", "value": "b", "expiry": 42})
            .as_object()
            .cloned()
            .unwrap();
        normalize_cookie(&mut cookie);
        assert_eq!(cookie["expiry"], json!(42));
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies(
            r#"[
                {"name": "sid", "value": "1", "domain": ".example.com", "path": "/",
                 "secure": true, "httpOnly": true, "sameSite": "None", "expiry": 1700000000.75},
                {"name": "pref", "value": "dark"}
            ]"#,
        )
        .unwrap();

        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].expiry, Some(1700000000));
        assert_eq!(cookies[0].http_only, Some(true));
        assert_eq!(cookies[0].domain.as_deref(), Some(".example.com"));
        assert_eq!(cookies[1].expiry, None);
        assert_eq!(cookies[1].domain, None);
    }

    #[test]
    fn test_parse_cookies_rejects_non_array() {
        assert!(parse_cookies(r#"{"name": "sid"}"#).is_err());
        assert!(parse_cookies(r#"[{"value": "no name"}]"#).is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "therapist".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("therapist"));
        assert!(!debug.contains("hunter2"));
    }
}
