//! Normalization: value normalizers, the rule book, the per-table engine and
//! the batch unifier.

pub mod engine;
pub mod pipeline;
pub mod rules;
pub mod values;

pub use engine::{normalize_table, NormalizeTrace, Normalizer};
pub use pipeline::{
    scan_folder, unify_files, unify_tables, unify_uploads, ProcessedFile, SkippedFile,
    UnifiedReport, Unifier, UnifyOptions, Upload, DEFAULT_REPORT_NAME,
};
pub use rules::{
    Commodity, CountryRule, Derivation, FieldMappingTable, RuleBook, RuleStage, COST_COLUMNS,
};
pub use values::{classify_transport, normalize_unit, TransportMode};
