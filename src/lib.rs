pub mod auth;
pub mod batch;
pub mod browser;
pub mod capture;
pub mod config;
pub mod error;

//  Re-export commonly used items
pub use auth::{ensure_authenticated, Credentials};
pub use batch::{collect_patient_ids, parse_page_keys, run_batch, BatchSummary, PatientBatchRequest};
pub use browser::{ChromeSession, Cookie, ElementHandle, LaunchOptions, Session};
pub use capture::{
    capture_page, capture_patient, sanitize_file_name, AttachStrategy, CaptureOptions,
    CaptureOutcome, FieldOutcome, PageReport,
};
pub use config::{AppConfig, PageDefinition, PageField, Selector};
pub use error::{AuthError, BrowserError, ConfigError, PageError};
