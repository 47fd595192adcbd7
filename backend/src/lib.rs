//! # Importaciones - customs import report unifier
//!
//! Takes the per-country customs import exports of one commodity (sodium
//! silicate) and rewrites them into a single report with a fixed set of
//! canonical columns.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │ detalle_CC_* │──▶│ Resolver │──▶│  Parser  │──▶│  Engine   │──▶│  Report  │
//! │ (csv / xlsx) │   │ (country)│   │ (RawTable│   │ (RuleBook)│   │  (xlsx)  │
//! └──────────────┘   └──────────┘   └──────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use importaciones::{scan_folder, unify_files, write_report, RuleBook, UnifyOptions};
//!
//! let rules = RuleBook::builtin();
//! let files = scan_folder("datos_importaciones", &UnifyOptions::default())?;
//! let report = unify_files(&files, &rules)?;
//! println!("{} rows, {} skipped files", report.len(), report.skipped.len());
//! write_report(&report, "importaciones_unificadas.xlsx")?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Canonical schema, raw and normalized tables
//! - [`country`] - Filename to country resolution
//! - [`normalize`] - Value normalizers, rule book, engine and batch unifier
//! - [`parser`] - CSV and spreadsheet readers
//! - [`report`] - xlsx / csv report writers
//! - [`config`] - Environment settings
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Domain
pub mod country;
pub mod normalize;

// I/O
pub mod parser;
pub mod report;

// Settings
pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, FileError, NormalizeError, PipelineError, PipelineResult, ReadError,
    ReportError, ResolveError, RuleBookError, ServerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{columns, Country, NormalizedRow, NormalizedTable, RawTable, CANONICAL_COLUMNS};

// =============================================================================
// Re-exports - Country resolution
// =============================================================================

pub use country::{country_token, CountryCatalog, DEFAULT_FILENAME_PREFIX};

// =============================================================================
// Re-exports - Normalization
// =============================================================================

pub use normalize::{
    classify_transport, normalize_table, normalize_unit, scan_folder, unify_files,
    unify_tables, unify_uploads, Commodity, CountryRule, Derivation, FieldMappingTable,
    NormalizeTrace, Normalizer, ProcessedFile, RuleBook, RuleStage, SkippedFile,
    TransportMode, UnifiedReport, Unifier, UnifyOptions, Upload, DEFAULT_REPORT_NAME,
};

// =============================================================================
// Re-exports - I/O
// =============================================================================

pub use parser::{read_file, read_table};
pub use report::{report_to_csv_bytes, report_to_xlsx_bytes, write_report};

pub use config::Settings;

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
