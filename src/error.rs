use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Timed out after {:.1}s waiting for {what}", .waited.as_secs_f64())]
    Timeout { what: String, waited: Duration },

    #[error("Element reference is stale or outside the current document: {0}")]
    StaleElement(String),

    #[error("Cannot switch into frame: {0}")]
    FrameUnavailable(String),

    #[error("Script execution failed: {0}")]
    Script(String),

    #[error("No page available")]
    NoPage,

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

/// Errors raised while loading configuration or resolving CLI inputs.
/// All of them happen before any browser interaction.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing required key `{0}`")]
    MissingKey(String),

    #[error("Selector `{0}` has an empty value")]
    EmptySelector(String),

    #[error("Page `{0}` has a field with an empty name")]
    EmptyFieldName(String),

    #[error("Page `{page}`: fields `{first}` and `{second}` would both be saved as `{stem}`")]
    FieldNameCollision {
        page: String,
        first: String,
        second: String,
        stem: String,
    },

    #[error("`{key}` is not a usable duration: {value}")]
    InvalidDuration { key: String, value: f64 },

    #[error("No patient IDs provided. Use --patient-ids or --patient-id-file")]
    NoPatientIds,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("WEBPT_USERNAME and WEBPT_PASSWORD must be set in environment or .env file")]
    MissingCredentials,

    #[error("Login failed: {0}")]
    Browser(#[from] BrowserError),
}

/// Page-level failures. These abort the page and propagate to the caller;
/// field-level failures never surface here.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Page `{page}`: url template `{template}` has no {{patient_id}} placeholder")]
    UrlTemplate { page: String, template: String },

    #[error("Page `{page}`: navigation failed: {source}")]
    Navigation {
        page: String,
        #[source]
        source: BrowserError,
    },

    #[error("Page `{page}` never became ready: {source}")]
    NotReady {
        page: String,
        #[source]
        source: BrowserError,
    },

    #[error("Page `{page}`: could not enter frame ({atomic}; fallback: {located})")]
    Frame {
        page: String,
        atomic: String,
        located: String,
    },

    #[error("Page `{page}`: failed to read page source: {source}")]
    PageSource {
        page: String,
        #[source]
        source: BrowserError,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
