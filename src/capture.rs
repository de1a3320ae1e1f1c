//! Page Capture Workflow
//!
//! Navigates a session to a patient page, optionally enters an embedded
//! frame, then captures every configured field as an element-bounded PNG.
//!
//! Failures are handled at two levels:
//! - page level (bad URL template, navigation, readiness timeout, frame entry,
//!   writing the page source) aborts the page and is returned as [`PageError`];
//! - field level (locate, scroll, highlight, screenshot) is recorded as a
//!   `<field>.error.txt` artifact next to where the image would have gone, and
//!   the next field is processed.
//!
//! Output layout: `<output_root>/<patient_id>/<page_key>/page_source.html`
//! plus one `<field>.png` or `<field>.error.txt` per configured field.

use crate::browser::wait::{wait_for_frame_and_switch, wait_for_presence};
use crate::browser::Session;
use crate::config::{AppConfig, PageDefinition, PageField, Selector};
use crate::error::PageError;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full document markup written for every captured page
pub const PAGE_SOURCE_FILE: &str = "page_source.html";

// ===== OPTIONS =====

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Bound for every element, readiness and frame wait
    pub timeout: Duration,

    /// Pause between scrolling a field into view and capturing it
    pub settle_delay: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            settle_delay: Duration::from_millis(200),
        }
    }
}

impl CaptureOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout: config.default_timeout,
            ..Default::default()
        }
    }
}

// ===== RESULTS =====

/// What happened to a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Image written to `path`
    Saved { path: PathBuf },

    /// Capture failed; the diagnostic was written to `record`
    Failed {
        message: String,
        trace: String,
        record: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub field: String,
    pub outcome: CaptureOutcome,
}

impl FieldOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self.outcome, CaptureOutcome::Saved { .. })
    }
}

/// Result of capturing one page for one patient
#[derive(Debug, Clone)]
pub struct PageReport {
    pub page_key: String,
    pub output_dir: PathBuf,
    pub page_source: PathBuf,
    /// One entry per configured field, in declaration order
    pub fields: Vec<FieldOutcome>,
}

impl PageReport {
    pub fn saved(&self) -> usize {
        self.fields.iter().filter(|f| f.is_saved()).count()
    }

    pub fn failed(&self) -> usize {
        self.fields.len() - self.saved()
    }
}

// ===== FRAME ENTRY =====

/// Which strategy got the session into the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStrategy {
    /// Waited for the frame to be available and switched in one step
    AtomicSwitch,
    /// Waited for the frame element, then switched into it explicitly
    LocateThenSwitch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFailure {
    pub atomic: String,
    pub located: String,
}

/// Frame entry state machine:
/// `Unattached -> Attached(AtomicSwitch)`, or
/// `Unattached -> Locating -> Attached(LocateThenSwitch)`, or
/// `Unattached -> Locating -> Failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameState {
    Unattached,
    Locating { atomic: String },
    Attached(AttachStrategy),
    Failed { atomic: String, located: String },
}

impl FrameState {
    async fn step<S: Session + ?Sized>(
        self,
        session: &S,
        selector: &Selector,
        timeout: Duration,
    ) -> FrameState {
        match self {
            FrameState::Unattached => {
                match wait_for_frame_and_switch(session, selector, timeout).await {
                    Ok(()) => FrameState::Attached(AttachStrategy::AtomicSwitch),
                    Err(e) => {
                        log::debug!("Atomic frame switch into {} failed: {}", selector, e);
                        FrameState::Locating {
                            atomic: e.to_string(),
                        }
                    }
                }
            }
            FrameState::Locating { atomic } => {
                let located = async {
                    let frame = wait_for_presence(session, selector, timeout).await?;
                    session.switch_to_frame(&frame).await
                }
                .await;
                match located {
                    Ok(()) => FrameState::Attached(AttachStrategy::LocateThenSwitch),
                    Err(e) => FrameState::Failed {
                        atomic,
                        located: e.to_string(),
                    },
                }
            }
            terminal => terminal,
        }
    }
}

/// Switch the session into the frame matching `selector`
pub async fn enter_frame<S: Session + ?Sized>(
    session: &S,
    selector: &Selector,
    timeout: Duration,
) -> Result<AttachStrategy, FrameFailure> {
    let mut state = FrameState::Unattached;
    loop {
        state = match state {
            FrameState::Attached(strategy) => return Ok(strategy),
            FrameState::Failed { atomic, located } => {
                return Err(FrameFailure { atomic, located })
            }
            pending => pending.step(session, selector, timeout).await,
        };
    }
}

// ===== CAPTURE =====

/// Replace every character outside `[A-Za-z0-9_-]` with `_`
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Capture every field of `page` for `patient_id`.
///
/// The session is returned to the top-level document before this returns,
/// whatever the outcome.
pub async fn capture_page<S: Session + ?Sized>(
    session: &S,
    page: &PageDefinition,
    patient_id: &str,
    output_root: &Path,
    options: &CaptureOptions,
) -> Result<PageReport, PageError> {
    let url = page
        .resolve_url(patient_id)
        .ok_or_else(|| PageError::UrlTemplate {
            page: page.key.clone(),
            template: page.url_template.clone(),
        })?;

    log::info!("📄 Capturing page `{}` for patient {}", page.key, patient_id);

    session
        .navigate(&url)
        .await
        .map_err(|source| PageError::Navigation {
            page: page.key.clone(),
            source,
        })?;

    let result = capture_loaded_page(session, page, patient_id, output_root, options).await;

    // Leave any frames
    if let Err(e) = session.switch_to_default_content().await {
        log::debug!("Failed to return to top-level document: {}", e);
    }

    result
}

async fn capture_loaded_page<S: Session + ?Sized>(
    session: &S,
    page: &PageDefinition,
    patient_id: &str,
    output_root: &Path,
    options: &CaptureOptions,
) -> Result<PageReport, PageError> {
    if let Some(ready) = &page.ready_selector {
        wait_for_presence(session, ready, options.timeout)
            .await
            .map_err(|source| PageError::NotReady {
                page: page.key.clone(),
                source,
            })?;
    }

    if let Some(frame) = &page.iframe {
        let strategy = enter_frame(session, frame, options.timeout)
            .await
            .map_err(|f| PageError::Frame {
                page: page.key.clone(),
                atomic: f.atomic,
                located: f.located,
            })?;
        log::debug!("Entered frame {} via {:?}", frame, strategy);
    }

    let output_dir = output_root.join(patient_id).join(&page.key);
    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|source| PageError::Io {
            path: output_dir.clone(),
            source,
        })?;

    let source = session
        .page_source()
        .await
        .map_err(|source| PageError::PageSource {
            page: page.key.clone(),
            source,
        })?;
    let page_source = output_dir.join(PAGE_SOURCE_FILE);
    tokio::fs::write(&page_source, source)
        .await
        .map_err(|source| PageError::Io {
            path: page_source.clone(),
            source,
        })?;

    let mut fields = Vec::with_capacity(page.fields.len());
    for field in &page.fields {
        fields.push(capture_field(session, field, &output_dir, options).await?);
    }

    let report = PageReport {
        page_key: page.key.clone(),
        output_dir,
        page_source,
        fields,
    };
    log::info!(
        "✓ Page `{}`: {} saved, {} failed",
        report.page_key,
        report.saved(),
        report.failed()
    );
    Ok(report)
}

/// Capture one field. Only a failure to write the error record escapes.
async fn capture_field<S: Session + ?Sized>(
    session: &S,
    field: &PageField,
    output_dir: &Path,
    options: &CaptureOptions,
) -> Result<FieldOutcome, PageError> {
    let stem = sanitize_file_name(&field.name);
    let image_path = output_dir.join(format!("{stem}.png"));

    match shoot_field(session, field, &image_path, options).await {
        Ok(()) => {
            log::debug!("  ✓ {} -> {}", field.name, image_path.display());
            Ok(FieldOutcome {
                field: field.name.clone(),
                outcome: CaptureOutcome::Saved { path: image_path },
            })
        }
        Err(err) => {
            let message = format!("Error capturing field '{}': {:#}", field.name, err);
            let trace = format!("{:?}", err);
            let record = output_dir.join(format!("{stem}.error.txt"));
            log::warn!("{}", message);

            let content = format!(
                "{}\n\nRecorded at {}\n\n{}\n",
                message,
                chrono::Utc::now().to_rfc3339(),
                trace
            );
            tokio::fs::write(&record, content)
                .await
                .map_err(|source| PageError::Io {
                    path: record.clone(),
                    source,
                })?;

            Ok(FieldOutcome {
                field: field.name.clone(),
                outcome: CaptureOutcome::Failed {
                    message,
                    trace,
                    record,
                },
            })
        }
    }
}

async fn shoot_field<S: Session + ?Sized>(
    session: &S,
    field: &PageField,
    image_path: &Path,
    options: &CaptureOptions,
) -> anyhow::Result<()> {
    let element = wait_for_presence(session, &field.selector, options.timeout)
        .await
        .with_context(|| format!("locating {}", field.selector))?;

    session
        .scroll_into_view(&element)
        .await
        .context("scrolling into view")?;

    tokio::time::sleep(options.settle_delay).await;

    session.highlight(&element).await.context("highlighting")?;

    let png = session
        .screenshot_element(&element)
        .await
        .context("capturing element screenshot")?;

    tokio::fs::write(image_path, png)
        .await
        .with_context(|| format!("writing {}", image_path.display()))?;

    Ok(())
}

/// Pages to capture, in configuration order. No subset (or an empty one)
/// selects every page.
pub fn select_pages<'a>(
    pages: &'a [PageDefinition],
    page_keys: Option<&[String]>,
) -> Vec<&'a PageDefinition> {
    match page_keys {
        Some(keys) if !keys.is_empty() => pages
            .iter()
            .filter(|p| keys.iter().any(|k| k == &p.key))
            .collect(),
        _ => pages.iter().collect(),
    }
}

/// Capture the selected pages for one patient.
///
/// A page-level error aborts the remaining pages and is returned as is.
pub async fn capture_patient<S: Session + ?Sized>(
    session: &S,
    pages: &[PageDefinition],
    patient_id: &str,
    output_root: &Path,
    page_keys: Option<&[String]>,
    options: &CaptureOptions,
) -> Result<Vec<PageReport>, PageError> {
    let mut reports = Vec::new();
    for page in select_pages(pages, page_keys) {
        reports.push(capture_page(session, page, patient_id, output_root, options).await?);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(key: &str) -> PageDefinition {
        PageDefinition {
            key: key.to_string(),
            url_template: format!("https://app.example.com/{key}/{{patient_id}}"),
            iframe: None,
            ready_selector: None,
            fields: vec![],
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Date of Birth"), "Date_of_Birth");
        assert_eq!(sanitize_file_name("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_file_name("plan-of_care2"), "plan-of_care2");
        assert_eq!(sanitize_file_name("Café"), "Caf_");
        assert_eq!(sanitize_file_name(""), "");
    }

    #[test]
    fn test_sanitize_is_idempotent_and_safe() {
        let samples = [
            "Date of Birth",
            "../../etc/passwd",
            "Ünïcødé ñame",
            "tab\tand\nnewline",
            "emoji 🩺 field",
            "already_safe-name",
        ];
        for sample in samples {
            let once = sanitize_file_name(sample);
            assert_eq!(sanitize_file_name(&once), once, "not idempotent for {sample:?}");
            assert!(
                once.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                "unsafe output {once:?}"
            );
            assert_eq!(once.chars().count(), sample.chars().count());
        }
    }

    #[test]
    fn test_select_pages() {
        let pages = vec![page("profile"), page("notes"), page("billing")];

        let all = select_pages(&pages, None);
        assert_eq!(all.len(), 3);

        let empty: Vec<String> = vec![];
        assert_eq!(select_pages(&pages, Some(&empty)).len(), 3);

        // Configuration order wins over subset order
        let subset = vec!["billing".to_string(), "profile".to_string()];
        let keys: Vec<_> = select_pages(&pages, Some(&subset))
            .iter()
            .map(|p| p.key.as_str())
            .collect();
        assert_eq!(keys, vec!["profile", "billing"]);

        let unknown = vec!["missing".to_string()];
        assert!(select_pages(&pages, Some(&unknown)).is_empty());
    }

    #[test]
    fn test_page_report_counts() {
        let report = PageReport {
            page_key: "profile".to_string(),
            output_dir: PathBuf::from("out/1/profile"),
            page_source: PathBuf::from("out/1/profile/page_source.html"),
            fields: vec![
                FieldOutcome {
                    field: "a".to_string(),
                    outcome: CaptureOutcome::Saved {
                        path: PathBuf::from("a.png"),
                    },
                },
                FieldOutcome {
                    field: "b".to_string(),
                    outcome: CaptureOutcome::Failed {
                        message: "m".to_string(),
                        trace: "t".to_string(),
                        record: PathBuf::from("b.error.txt"),
                    },
                },
            ],
        };
        assert_eq!(report.saved(), 1);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn test_default_capture_options() {
        let options = CaptureOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(20));
        assert_eq!(options.settle_delay, Duration::from_millis(200));
    }
}
