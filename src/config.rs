//! Capture configuration
//!
//! Loads the YAML file describing the login form, the patient pages and the
//! fields to capture on each page. Everything is validated here so that a bad
//! selector is reported before a browser is ever launched.

use crate::capture::sanitize_file_name;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder substituted with the patient identifier in page URL templates
pub const PATIENT_ID_PLACEHOLDER: &str = "{patient_id}";

/// Environment variables that override the `headless` setting, first set wins
pub const HEADLESS_ENV: [&str; 2] = ["SELENIUM_HEADLESS", "WEBPT_HEADLESS"];

/// How to locate an element in a rendered document.
///
/// Deserializes from `{type: css|xpath, value: "..."}`; any other `type` is
/// rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Selector {
    Css(String),
    #[serde(rename = "xpath")]
    XPath(String),
}

impl Selector {
    pub fn value(&self) -> &str {
        match self {
            Selector::Css(v) | Selector::XPath(v) => v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Selector::Css(_) => "css",
            Selector::XPath(_) => "xpath",
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageField {
    pub name: String,
    pub selector: Selector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDefinition {
    pub key: String,
    /// e.g. `https://app.example.com/patients/{patient_id}/profile`
    pub url_template: String,
    pub iframe: Option<Selector>,
    /// Element whose presence means the page is ready to inspect
    pub ready_selector: Option<Selector>,
    /// Fields in declaration order
    pub fields: Vec<PageField>,
}

impl PageDefinition {
    /// Substitute the patient identifier into the URL template.
    ///
    /// Returns `None` when the template has no `{patient_id}` placeholder.
    pub fn resolve_url(&self, patient_id: &str) -> Option<String> {
        if !self.url_template.contains(PATIENT_ID_PLACEHOLDER) {
            return None;
        }
        Some(
            self.url_template
                .replace(PATIENT_ID_PLACEHOLDER, patient_id),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginConfig {
    pub url: String,
    pub username_selector: Selector,
    pub password_selector: Selector,
    pub submit_selector: Selector,
    pub post_login_wait: Duration,
    /// Optional JSON cookie export replayed instead of logging in
    pub cookies_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrowserSettings {
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub base_url: String,
    pub login: LoginConfig,
    pub pages: Vec<PageDefinition>,
    pub default_timeout: Duration,
    pub headless: bool,
    pub browser: BrowserSettings,
}

impl AppConfig {
    /// Load and validate a YAML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML configuration text
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content)?;
        raw.into_config()
    }

    /// Headless mode after applying the `SELENIUM_HEADLESS` (or
    /// `WEBPT_HEADLESS`) override
    pub fn effective_headless(&self) -> bool {
        let env_value = headless_env_value(|name| std::env::var(name).ok());
        headless_override(env_value.as_deref(), self.headless)
    }

    /// Page-load timeout handed to the browser session
    pub fn page_load_timeout(&self) -> Duration {
        self.default_timeout.max(Duration::from_secs(10))
    }

    pub fn page(&self, key: &str) -> Option<&PageDefinition> {
        self.pages.iter().find(|p| p.key == key)
    }
}

/// Value of the first headless override variable that is set
pub fn headless_env_value(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    HEADLESS_ENV.iter().find_map(|name| lookup(name))
}

/// `0` and `false` (any case) turn headless off; any other value turns it on.
/// An unset variable keeps the configured value.
pub fn headless_override(env_value: Option<&str>, configured: bool) -> bool {
    match env_value {
        None => configured,
        Some(v) => {
            let v = v.trim();
            !(v == "0" || v.eq_ignore_ascii_case("false"))
        }
    }
}

// ===== RAW YAML SHAPE =====

#[derive(Debug, Deserialize)]
struct RawConfig {
    base_url: Option<String>,
    login: Option<RawLogin>,
    #[serde(default)]
    patients: Option<RawPatients>,
    #[serde(default = "default_timeout_seconds")]
    default_timeout_seconds: u64,
    #[serde(default = "default_headless")]
    headless: bool,
    #[serde(default)]
    browser: BrowserSettings,
}

#[derive(Debug, Deserialize)]
struct RawLogin {
    url: String,
    username_selector: Selector,
    password_selector: Selector,
    submit_selector: Selector,
    #[serde(default = "default_post_login_wait")]
    post_login_wait_seconds: f64,
    #[serde(default)]
    cookies_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPatients {
    /// Mappings keep declaration order, which defines capture order
    #[serde(default)]
    pages: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    url_template: String,
    #[serde(default)]
    iframe: Option<Selector>,
    #[serde(default)]
    ready_selector: Option<Selector>,
    #[serde(default)]
    fields: Option<serde_yaml::Mapping>,
}

impl RawConfig {
    fn into_config(self) -> Result<AppConfig, ConfigError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ConfigError::MissingKey("base_url".to_string()))?;
        let login = self
            .login
            .ok_or_else(|| ConfigError::MissingKey("login".to_string()))?;

        check_selector("login.username_selector", &login.username_selector)?;
        check_selector("login.password_selector", &login.password_selector)?;
        check_selector("login.submit_selector", &login.submit_selector)?;

        let mut pages = Vec::new();
        let raw_pages = self
            .patients
            .and_then(|p| p.pages)
            .unwrap_or_default();
        for (key, value) in raw_pages {
            let key = mapping_key(key, "patients.pages")?;
            let raw: RawPage = serde_yaml::from_value(value)?;
            pages.push(raw.into_page(key)?);
        }

        Ok(AppConfig {
            base_url,
            login: LoginConfig {
                url: login.url,
                username_selector: login.username_selector,
                password_selector: login.password_selector,
                submit_selector: login.submit_selector,
                post_login_wait: seconds(
                    "login.post_login_wait_seconds",
                    login.post_login_wait_seconds,
                )?,
                cookies_path: login.cookies_path,
            },
            pages,
            default_timeout: Duration::from_secs(self.default_timeout_seconds),
            headless: self.headless,
            browser: self.browser,
        })
    }
}

impl RawPage {
    fn into_page(self, key: String) -> Result<PageDefinition, ConfigError> {
        if let Some(sel) = &self.iframe {
            check_selector(&format!("patients.pages.{key}.iframe"), sel)?;
        }
        if let Some(sel) = &self.ready_selector {
            check_selector(&format!("patients.pages.{key}.ready_selector"), sel)?;
        }

        let mut fields: Vec<PageField> = Vec::new();
        for (name, value) in self.fields.unwrap_or_default() {
            let name = mapping_key(name, &format!("patients.pages.{key}.fields"))?;
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyFieldName(key));
            }
            // Each field owns one artifact file name
            let stem = sanitize_file_name(&name);
            if let Some(other) = fields.iter().find(|f| sanitize_file_name(&f.name) == stem) {
                return Err(ConfigError::FieldNameCollision {
                    page: key,
                    first: other.name.clone(),
                    second: name,
                    stem,
                });
            }
            let selector: Selector = serde_yaml::from_value(value)?;
            check_selector(&format!("patients.pages.{key}.fields.{name}"), &selector)?;
            fields.push(PageField { name, selector });
        }

        Ok(PageDefinition {
            key,
            url_template: self.url_template,
            iframe: self.iframe,
            ready_selector: self.ready_selector,
            fields,
        })
    }
}

/// Negative values count as zero; infinite, NaN or out-of-range values are rejected
fn seconds(key: &str, value: f64) -> Result<Duration, ConfigError> {
    let clamped = if value < 0.0 { 0.0 } else { value };
    Duration::try_from_secs_f64(clamped).map_err(|_| ConfigError::InvalidDuration {
        key: key.to_string(),
        value,
    })
}

fn check_selector(path: &str, selector: &Selector) -> Result<(), ConfigError> {
    if selector.value().trim().is_empty() {
        return Err(ConfigError::EmptySelector(path.to_string()));
    }
    Ok(())
}

/// YAML allows non-string keys (`123:`); page keys and field names are
/// always treated as text.
fn mapping_key(key: serde_yaml::Value, path: &str) -> Result<String, ConfigError> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ConfigError::MissingKey(format!("{path}.<string key>"))),
    }
}

fn default_timeout_seconds() -> u64 {
    20
}

fn default_headless() -> bool {
    true
}

fn default_post_login_wait() -> f64 {
    5.0
}

fn default_window_width() -> u32 {
    1600
}

fn default_window_height() -> u32 {
    1200
}
