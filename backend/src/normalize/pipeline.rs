//! Batch unifier.
//!
//! Drives every input of a batch through resolve → read → normalize, keeps
//! the successes in arrival order and records the failures as skipped files.
//! One bad file never aborts the batch; a batch with no success does.
//!
//! # Example
//!
//! ```rust,ignore
//! use importaciones::{scan_folder, unify_files, write_report, RuleBook, UnifyOptions};
//!
//! let rules = RuleBook::builtin();
//! let files = scan_folder("datos_importaciones", &UnifyOptions::default())?;
//! let report = unify_files(&files, &rules)?;
//! write_report(&report, "importaciones_unificadas.xlsx")?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::api::logs::{log_info, log_info_indent, log_success, log_success_indent, log_warning, log_warning_indent};
use crate::country::DEFAULT_FILENAME_PREFIX;
use crate::error::{FileError, PipelineError, PipelineResult, ReadResult};
use crate::models::{Country, NormalizedRow, NormalizedTable, RawTable};
use crate::normalize::engine::{NormalizeTrace, Normalizer};
use crate::normalize::rules::RuleBook;
use crate::parser::{read_file, read_table};

/// Default report filename.
pub const DEFAULT_REPORT_NAME: &str = "importaciones_unificadas.xlsx";

/// Options for folder scans and filename resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifyOptions {
    /// Prefix every input filename must carry.
    pub filename_prefix: String,

    /// Extensions picked up by [`scan_folder`], lowercase, without dot.
    pub extensions: Vec<String>,
}

impl Default for UnifyOptions {
    fn default() -> Self {
        Self {
            filename_prefix: DEFAULT_FILENAME_PREFIX.to_string(),
            extensions: vec!["xlsx".into(), "xls".into(), "csv".into()],
        }
    }
}

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A file excluded from the batch and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: String,
}

/// A file that made it into the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedFile {
    pub filename: String,
    pub country: Country,
    pub rows: usize,
}

/// Result of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedReport {
    /// Concatenated rows, file by file in arrival order.
    pub rows: Vec<NormalizedRow>,
    pub files: Vec<ProcessedFile>,
    pub skipped: Vec<SkippedFile>,
}

impl UnifiedReport {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows flagged `Aplica? = SI`.
    pub fn applicable_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.get(crate::models::columns::APLICA).and_then(|v| v.as_str()) == Some("SI"))
            .count()
    }
}

/// List input files in `dir`, sorted by filename.
///
/// Only names starting with the prefix and ending in an accepted extension
/// are returned. Subdirectories are not visited.
pub fn scan_folder(dir: impl AsRef<Path>, options: &UnifyOptions) -> PipelineResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if name.starts_with(&options.filename_prefix) && options.extensions.contains(&ext) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Runs batches against one rule book.
#[derive(Debug, Clone)]
pub struct Unifier<'a> {
    rules: &'a RuleBook,
    options: UnifyOptions,
}

impl<'a> Unifier<'a> {
    pub fn new(rules: &'a RuleBook) -> Self {
        Self {
            rules,
            options: UnifyOptions::default(),
        }
    }

    pub fn with_options(mut self, options: UnifyOptions) -> Self {
        self.options = options;
        self
    }

    /// Unify already-parsed tables.
    pub fn unify_tables(&self, inputs: Vec<(String, RawTable)>) -> PipelineResult<UnifiedReport> {
        self.run(inputs.into_iter().map(|(filename, table)| {
            let load = move || -> ReadResult<RawTable> { Ok(table) };
            (filename, Box::new(load) as Loader<'_>)
        }))
    }

    /// Unify files on disk.
    pub fn unify_files(&self, paths: &[PathBuf]) -> PipelineResult<UnifiedReport> {
        self.run(paths.iter().map(|path| {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            let load = move || read_file(path);
            (filename, Box::new(load) as Loader<'_>)
        }))
    }

    /// Unify uploaded files.
    pub fn unify_uploads(&self, uploads: Vec<Upload>) -> PipelineResult<UnifiedReport> {
        self.run(uploads.into_iter().map(|upload| {
            let Upload { filename, bytes } = upload;
            let name = filename.clone();
            let load = move || read_table(&name, &bytes);
            (filename, Box::new(load) as Loader<'_>)
        }))
    }

    fn run<'l>(
        &self,
        inputs: impl Iterator<Item = (String, Loader<'l>)>,
    ) -> PipelineResult<UnifiedReport> {
        let mut report = UnifiedReport {
            rows: Vec::new(),
            files: Vec::new(),
            skipped: Vec::new(),
        };

        for (filename, load) in inputs {
            log_info(format!("📄 Processing {}", filename));

            match self.process(&filename, load) {
                Ok((table, trace)) => {
                    log_trace(&trace);
                    log_success_indent(
                        format!("{}: {} rows ({})", filename, table.len(), table.country.name),
                        1,
                    );
                    report.files.push(ProcessedFile {
                        filename,
                        country: table.country,
                        rows: table.rows.len(),
                    });
                    report.rows.extend(table.rows);
                }
                Err(err) => {
                    log_warning_indent(format!("Skipped {}: {}", filename, err), 1);
                    report.skipped.push(SkippedFile {
                        filename,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if report.files.is_empty() {
            log_warning("No files processed");
            return Err(PipelineError::EmptyBatchResult {
                skipped: report.skipped,
            });
        }

        log_success(format!(
            "Unified {} rows from {} files ({} skipped)",
            report.rows.len(),
            report.files.len(),
            report.skipped.len()
        ));

        Ok(report)
    }

    fn process(
        &self,
        filename: &str,
        load: Loader<'_>,
    ) -> Result<(NormalizedTable, NormalizeTrace), FileError> {
        let country = self
            .rules
            .countries
            .resolve_filename(filename, &self.options.filename_prefix)?
            .clone();
        log_info_indent(format!("Country: {}", country), 1);

        let table = load()?;
        let normalized = Normalizer::new(self.rules).normalize_with_trace(table, &country)?;
        Ok(normalized)
    }
}

type Loader<'l> = Box<dyn FnOnce() -> ReadResult<RawTable> + 'l>;

fn log_trace(trace: &NormalizeTrace) {
    for (target, source) in &trace.mapped {
        log_info_indent(format!("{} <- '{}'", target, source), 2);
    }
    for (target, source) in &trace.unmapped {
        log_warning_indent(format!("{}: column '{}' not found", target, source), 2);
    }
    for rule in &trace.rules_fired {
        log_info_indent(format!("rule {}", rule), 2);
    }
    if trace.undated_rows > 0 {
        log_warning_indent(format!("{} rows without a readable date", trace.undated_rows), 2);
    }
}

/// [`Unifier::unify_tables`] with default options.
pub fn unify_tables(inputs: Vec<(String, RawTable)>, rules: &RuleBook) -> PipelineResult<UnifiedReport> {
    Unifier::new(rules).unify_tables(inputs)
}

/// [`Unifier::unify_files`] with default options.
pub fn unify_files(paths: &[PathBuf], rules: &RuleBook) -> PipelineResult<UnifiedReport> {
    Unifier::new(rules).unify_files(paths)
}

/// [`Unifier::unify_uploads`] with default options.
pub fn unify_uploads(uploads: Vec<Upload>, rules: &RuleBook) -> PipelineResult<UnifiedReport> {
    Unifier::new(rules).unify_uploads(uploads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CANONICAL_COLUMNS;
    use serde_json::{json, Value};

    fn raw(records: Vec<Value>) -> RawTable {
        RawTable::from_records(records)
    }

    fn ar_table() -> RawTable {
        raw(vec![
            json!({"Fecha": "15/03/2024", "Cantidad": 4, "Unidad": "Toneladas", "U$S FOB": 1000}),
            json!({"Fecha": "16/03/2024", "Cantidad": 500, "Unidad": "KG", "U$S FOB": 300}),
        ])
    }

    fn br_table() -> RawTable {
        raw(vec![json!({"Fecha": "2024-04-01", "Cantidad": 20000, "Unidad": "Kilogramo"})])
    }

    #[test]
    fn test_partial_failure_tolerance() {
        let rules = RuleBook::builtin();
        let report = unify_tables(
            vec![
                ("detalle_AR_2024.xlsx".into(), ar_table()),
                ("detalle_XX_2024.xlsx".into(), raw(vec![json!({"a": 1})])),
                ("detalle_BR_2024.xlsx".into(), br_table()),
            ],
            &rules,
        )
        .unwrap();

        assert_eq!(report.len(), 3);
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].filename, "detalle_XX_2024.xlsx");
        assert!(report.skipped[0].reason.contains("XX"));

        // Arrival order: AR rows first, then BR
        let countries: Vec<&Value> = report.rows.iter().map(|r| r.get("País").unwrap()).collect();
        assert_eq!(countries, vec![&json!("Argentina"), &json!("Argentina"), &json!("Brasil")]);
    }

    #[test]
    fn test_empty_batch() {
        let rules = RuleBook::builtin();
        let err = unify_tables(
            vec![
                ("informe.xlsx".into(), ar_table()),
                ("detalle_ZZ_1.csv".into(), ar_table()),
            ],
            &rules,
        )
        .unwrap_err();

        match err {
            PipelineError::EmptyBatchResult { skipped } => {
                assert_eq!(skipped.len(), 2);
                assert!(skipped[0].reason.contains("Malformed"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(unify_tables(Vec::new(), &rules).is_err());
    }

    #[test]
    fn test_argentina_and_chile_end_to_end() {
        let rules = RuleBook::builtin();
        let chile = raw(vec![json!({
            "Fecha": "2024-05-10",
            "Cantidad": 20,
            "Unidad": "TONELADAS",
            "FOB U$S": 5000,
            "U$S CIF": 5600,
            "Transporte": "MARITIMO",
            "Transportista": "Naviera Sur"
        })]);
        let report = unify_tables(
            vec![
                ("detalle_AR_2024.csv".into(), ar_table()),
                ("detalle_CL_2024.csv".into(), chile),
            ],
            &rules,
        )
        .unwrap();

        assert_eq!(report.len(), 3);
        for row in &report.rows {
            assert_eq!(row.values().len(), CANONICAL_COLUMNS.len());
        }

        let ar = &report.rows[0];
        assert_eq!(ar.get("FOB (Total)"), Some(&json!(1000)));
        assert_eq!(ar.get("FOB (Unitario Tn)").and_then(Value::as_f64), Some(250.0));
        assert_eq!(ar.get("Aplica?"), Some(&json!("SI")));
        assert_eq!(report.rows[1].get("Aplica?"), Some(&json!("NO")));

        let cl = &report.rows[2];
        assert_eq!(cl.get("País"), Some(&json!("Chile")));
        assert_eq!(cl.get("FOB (Total)"), Some(&json!(5000)));
        assert_eq!(cl.get("CIF (Total)"), Some(&json!(5600)));
        assert_eq!(cl.get("Vía Transporte"), Some(&json!("Marítimo")));
        assert_eq!(cl.get("Empresa Transportista"), Some(&json!("Naviera Sur")));
        // Argentina's derived unit FOB does not leak into Chile rows
        assert_eq!(cl.get("FOB (Unitario Tn)"), Some(&Value::Null));

        assert_eq!(report.applicable_rows(), 2);
    }

    #[test]
    fn test_unify_uploads() {
        let rules = RuleBook::builtin();
        let csv = "Fecha;Cantidad;Unidad;U$S FOB\n2024-01-15;3;TONELADAS;900\n";
        let report = unify_uploads(
            vec![
                Upload {
                    filename: "detalle_UY_enero.csv".into(),
                    bytes: csv.as_bytes().to_vec(),
                },
                Upload {
                    filename: "detalle_UY_enero.pdf".into(),
                    bytes: b"%PDF".to_vec(),
                },
            ],
            &rules,
        )
        .unwrap();

        assert_eq!(report.len(), 1);
        assert_eq!(report.files[0].country.code, "UY");
        assert_eq!(report.rows[0].get("FOB (Total)"), Some(&json!(900)));
        assert!(report.skipped[0].reason.contains("Unsupported file format"));
    }

    #[test]
    fn test_accented_utf8_headers_map_to_canonical_columns() {
        let rules = RuleBook::builtin();
        let chile = "País de Origen,País de Adquisición,Cantidad,Unidad\nChina,Perú,10,TONELADAS\n";
        let bolivia = "País de Proveedor;Descripción Arancelaria;Cantidad\nBrasil;Silicato de sodio;2500\n";
        let report = unify_uploads(
            vec![
                Upload {
                    filename: "detalle_CL_1.csv".into(),
                    bytes: chile.as_bytes().to_vec(),
                },
                Upload {
                    filename: "detalle_BO_1.csv".into(),
                    bytes: bolivia.as_bytes().to_vec(),
                },
            ],
            &rules,
        )
        .unwrap();

        assert!(report.skipped.is_empty());
        let cl = &report.rows[0];
        assert_eq!(cl.get("País de Origen"), Some(&json!("China")));
        assert_eq!(cl.get("País de Procedencia"), Some(&json!("Perú")));

        let bo = &report.rows[1];
        assert_eq!(bo.get("País de Procedencia"), Some(&json!("Brasil")));
        assert_eq!(bo.get("Descripción de Mercadería"), Some(&json!("Silicato de sodio")));
    }

    #[test]
    fn test_scan_folder_and_unify_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("detalle_PE_2024.csv"),
            "Fecha;Cantidad;Unidad;Puerto\n2024-02-01;2000;KG;Callao\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("detalle_BO_2024.csv"),
            "Fecha;Cantidad;U$S CIF\n2024-02-03;5000;1200\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("resumen.csv"), "a;b\n1;2\n").unwrap();
        std::fs::write(dir.path().join("detalle_AR_notas.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("detalle_CL_dir.csv")).unwrap();

        let files = scan_folder(dir.path(), &UnifyOptions::default()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["detalle_BO_2024.csv", "detalle_PE_2024.csv"]);

        let rules = RuleBook::builtin();
        let report = unify_files(&files, &rules).unwrap();
        assert_eq!(report.len(), 2);

        let bo = &report.rows[0];
        assert_eq!(bo.get("Unidad de Medida"), Some(&json!("KILOGRAMOS")));
        assert_eq!(bo.get("Toneladas Finales").and_then(Value::as_f64), Some(5.0));
        assert_eq!(bo.get("CIF (Total)"), Some(&json!(1200)));

        let pe = &report.rows[1];
        assert_eq!(pe.get("Puerto de Embarque"), Some(&json!("Callao")));
        assert_eq!(pe.get("Aplica?"), Some(&json!("SI")));
    }

    #[test]
    fn test_custom_prefix() {
        let rules = RuleBook::builtin();
        let options = UnifyOptions {
            filename_prefix: "impo_".into(),
            ..UnifyOptions::default()
        };
        let report = Unifier::new(&rules)
            .with_options(options)
            .unify_tables(vec![("impo_EC_1.xlsx".into(), raw(vec![json!({})]))])
            .unwrap();
        assert_eq!(report.files[0].country.name, "Ecuador");
    }
}
