//! REST API response types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::normalize::pipeline::{ProcessedFile, SkippedFile, UnifiedReport};

/// JSON summary returned by `POST /api/preview`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    /// Unique batch identifier
    pub batch_id: String,

    /// "ready" when every file was processed, "warning" when some were skipped
    pub status: String,

    /// Normalized rows as ordered objects
    pub rows: Vec<Map<String, Value>>,

    pub metadata: BatchMetadata,
}

/// Counts and per-file outcome of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    pub total_rows: usize,
    pub applicable_rows: usize,
    pub files: Vec<FileSummary>,
    pub skipped: Vec<SkippedSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub filename: String,
    pub country_code: String,
    pub country: String,
    pub rows: usize,
}

impl From<&ProcessedFile> for FileSummary {
    fn from(file: &ProcessedFile) -> Self {
        Self {
            filename: file.filename.clone(),
            country_code: file.country.code.clone(),
            country: file.country.name.clone(),
            rows: file.rows,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSummary {
    pub filename: String,
    pub reason: String,
}

impl From<&SkippedFile> for SkippedSummary {
    fn from(file: &SkippedFile) -> Self {
        Self {
            filename: file.filename.clone(),
            reason: file.reason.clone(),
        }
    }
}

impl PreviewResponse {
    pub fn new(batch_id: Uuid, report: &UnifiedReport) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            status: if report.skipped.is_empty() { "ready" } else { "warning" }.to_string(),
            rows: report.rows.iter().map(|r| r.to_object()).collect(),
            metadata: BatchMetadata::from(report),
        }
    }
}

impl From<&UnifiedReport> for BatchMetadata {
    fn from(report: &UnifiedReport) -> Self {
        Self {
            total_rows: report.len(),
            applicable_rows: report.applicable_rows(),
            files: report.files.iter().map(FileSummary::from).collect(),
            skipped: report.skipped.iter().map(SkippedSummary::from).collect(),
        }
    }
}

/// Create an error response for the batch `batch_id`.
pub fn error_response(batch_id: Uuid, error: &str, skipped: &[SkippedFile]) -> Value {
    json!({
        "batchId": batch_id.to_string(),
        "status": "error",
        "error": error,
        "rows": [],
        "metadata": {
            "totalRows": 0,
            "applicableRows": 0,
            "files": [],
            "skipped": skipped.iter().map(SkippedSummary::from).collect::<Vec<_>>()
        }
    })
}
