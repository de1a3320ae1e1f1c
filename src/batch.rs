//! Batch driver: patients × pages

use crate::browser::Session;
use crate::capture::{capture_patient, CaptureOptions, PageReport};
use crate::config::AppConfig;
use crate::error::{ConfigError, PageError};
use std::path::{Path, PathBuf};

/// Which patients and pages to capture in one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientBatchRequest {
    pub patient_ids: Vec<String>,
    /// `None` captures every configured page
    pub page_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub patients: usize,
    pub pages: usize,
    pub saved: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, reports: &[PageReport]) {
        self.patients += 1;
        self.pages += reports.len();
        self.saved += reports.iter().map(PageReport::saved).sum::<usize>();
        self.failed += reports.iter().map(PageReport::failed).sum::<usize>();
    }
}

/// Literal IDs first, then the non-blank lines of `id_file`
pub fn collect_patient_ids(
    literal_ids: &[String],
    id_file: Option<&Path>,
) -> Result<Vec<String>, ConfigError> {
    let mut ids: Vec<String> = literal_ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();

    if let Some(path) = id_file {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: PathBuf::from(path),
            source,
        })?;
        ids.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from),
        );
    }

    if ids.is_empty() {
        return Err(ConfigError::NoPatientIds);
    }
    Ok(ids)
}

/// Split a comma-separated list of page keys. Blank input selects all pages.
pub fn parse_page_keys(raw: Option<&str>) -> Option<Vec<String>> {
    let keys: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect();
    (!keys.is_empty()).then_some(keys)
}

/// Capture every requested patient in order.
///
/// A page-level error stops the whole batch and is returned to the caller.
pub async fn run_batch<S: Session + ?Sized>(
    session: &S,
    config: &AppConfig,
    request: &PatientBatchRequest,
    output_root: &Path,
    options: &CaptureOptions,
) -> Result<BatchSummary, PageError> {
    if let Some(keys) = &request.page_keys {
        for key in keys.iter().filter(|k| config.page(k).is_none()) {
            log::warn!("Page `{}` is not configured and will be skipped", key);
        }
    }

    let mut summary = BatchSummary::default();
    for patient_id in &request.patient_ids {
        println!("Capturing patient {} ...", patient_id);
        let reports = capture_patient(
            session,
            &config.pages,
            patient_id,
            output_root,
            request.page_keys.as_deref(),
            options,
        )
        .await?;
        summary.record(&reports);
    }

    Ok(summary)
}
