//! Error types for the import unification pipeline.
//!
//! This module defines one error enum per layer:
//!
//! - [`ResolveError`] - filename to country resolution
//! - [`ReadError`] - reading a CSV/Excel file into a raw table
//! - [`NormalizeError`] - the normalization engine
//! - [`FileError`] - any per-file failure (the batch skips the file)
//! - [`RuleBookError`] - loading and validating the rule book
//! - [`ConfigError`] - environment settings
//! - [`ReportError`] - writing the unified report
//! - [`PipelineError`] - batch-level terminal errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Missing columns and unparseable cell values are never errors: the engine
//! resolves them to the missing marker.

use thiserror::Error;

// =============================================================================
// Country Resolution Errors
// =============================================================================

/// Errors while deriving a country from a filename.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Filename lacks the expected prefix or a second `_` token.
    #[error("Malformed filename '{0}': expected detalle_<CC>_...")]
    MalformedFilename(String),

    /// The country token is not in the catalog.
    #[error("Unrecognized country code '{code}' in {filename}")]
    UnrecognizedCountry { filename: String, code: String },
}

// =============================================================================
// Input Reading Errors
// =============================================================================

/// Errors while reading an input file into a [`crate::models::RawTable`].
#[derive(Debug, Error)]
pub enum ReadError {
    /// Extension is neither CSV nor a spreadsheet format.
    #[error("Unsupported file format: {0}")]
    UnsupportedFileFormat(String),

    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Content could not be decoded.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Invalid CSV content.
    #[error("Invalid CSV: {0}")]
    Csv(String),

    /// Invalid or unreadable workbook.
    #[error("Invalid spreadsheet: {0}")]
    Excel(String),

    /// Empty file.
    #[error("File is empty")]
    EmptyFile,

    /// No header row.
    #[error("No headers found")]
    NoHeaders,
}

impl From<csv::Error> for ReadError {
    fn from(err: csv::Error) -> Self {
        ReadError::Csv(err.to_string())
    }
}

impl From<calamine::Error> for ReadError {
    fn from(err: calamine::Error) -> Self {
        ReadError::Excel(err.to_string())
    }
}

// =============================================================================
// Normalization Errors
// =============================================================================

/// Errors from the normalization engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// Country has no entry in the field mapping table.
    #[error("Unsupported country: {0}")]
    UnsupportedCountry(String),
}

// =============================================================================
// Per-file Errors
// =============================================================================

/// Any failure that excludes one file from a batch.
///
/// The `Display` output is the skip reason reported to the caller.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

// =============================================================================
// Rule Book Errors
// =============================================================================

/// Errors while loading or validating a rule book.
#[derive(Debug, Error)]
pub enum RuleBookError {
    /// IO error.
    #[error("Rule book IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Rule book JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally valid JSON that breaks a rule book invariant.
    #[error("Invalid rule book: {0}")]
    Invalid(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading process settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds an unusable value.
    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: String, value: String },

    /// The configured rule book could not be loaded.
    #[error(transparent)]
    RuleBook(#[from] RuleBookError),
}

// =============================================================================
// Report Errors
// =============================================================================

/// Errors while writing the unified report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// IO error.
    #[error("Report IO error: {0}")]
    Io(#[from] std::io::Error),

    /// XLSX writer error.
    #[error("XLSX error: {0}")]
    Xlsx(String),

    /// CSV writer error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// Output extension not supported.
    #[error("Unsupported report format: {0}")]
    UnsupportedFormat(String),
}

impl From<rust_xlsxwriter::XlsxError> for ReportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ReportError::Xlsx(err.to_string())
    }
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::Csv(err.to_string())
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Batch-level errors.
///
/// This is the error type returned by the unifier entrypoints in
/// [`crate::normalize::pipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No file survived normalization; no report is produced.
    #[error("No files processed ({} skipped)", skipped.len())]
    EmptyBatchResult { skipped: Vec<crate::normalize::pipeline::SkippedFile> },

    /// IO error (folder scan).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Report writing error.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Rule book error.
    #[error("Rule book error: {0}")]
    RuleBook(#[from] RuleBookError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for country resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for input reading.
pub type ReadResult<T> = Result<T, ReadError>;

/// Result type for the normalization engine.
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Result type for rule book loading.
pub type RuleBookResult<T> = Result<T, RuleBookError>;

/// Result type for settings.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for report writing.
pub type ReportResult<T> = Result<T, ReportError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ResolveError -> FileError keeps the message
        let err = ResolveError::UnrecognizedCountry {
            filename: "detalle_XX_2.csv".into(),
            code: "XX".into(),
        };
        let file_err: FileError = err.into();
        assert!(file_err.to_string().contains("XX"));
        assert!(file_err.to_string().contains("detalle_XX_2.csv"));

        // ReadError -> FileError
        let file_err: FileError = ReadError::UnsupportedFileFormat("a.pdf".into()).into();
        assert!(file_err.to_string().contains("a.pdf"));
    }

    #[test]
    fn test_empty_batch_message() {
        let err = PipelineError::EmptyBatchResult { skipped: Vec::new() };
        assert!(err.to_string().contains("No files processed"));
    }

    #[test]
    fn test_report_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing dir");
        let err: ReportError = io.into();
        assert!(err.to_string().contains("missing dir"));
    }
}
