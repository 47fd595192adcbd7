//! Report writers.
//!
//! The unified report is one sheet (or one CSV) with the canonical header row
//! followed by every row of the batch. Missing cells are written empty.

use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde_json::Value;
use std::path::Path;

use crate::error::{ReportError, ReportResult};
use crate::models::CANONICAL_COLUMNS;
use crate::normalize::pipeline::UnifiedReport;

/// Worksheet name in the xlsx report.
pub const SHEET_NAME: &str = "Importaciones";

/// Write the report; the extension (`.xlsx` or `.csv`) picks the format.
pub fn write_report(report: &UnifiedReport, path: impl AsRef<Path>) -> ReportResult<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "xlsx" => {
            let mut workbook = build_workbook(report)?;
            workbook.save(path)?;
        }
        "csv" => {
            let bytes = report_to_csv_bytes(report)?;
            std::fs::write(path, bytes)?;
        }
        _ => return Err(ReportError::UnsupportedFormat(path.display().to_string())),
    }

    Ok(())
}

/// The xlsx report in memory.
pub fn report_to_xlsx_bytes(report: &UnifiedReport) -> ReportResult<Vec<u8>> {
    let mut workbook = build_workbook(report)?;
    Ok(workbook.save_to_buffer()?)
}

/// The CSV report in memory, UTF-8 with a `,` delimiter.
pub fn report_to_csv_bytes(report: &UnifiedReport) -> ReportResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CANONICAL_COLUMNS)?;

    for row in &report.rows {
        writer.write_record(row.values().iter().map(csv_field))?;
    }

    writer
        .into_inner()
        .map_err(|e| ReportError::Csv(e.to_string()))
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_workbook(report: &UnifiedReport) -> ReportResult<Workbook> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, name) in CANONICAL_COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &header_format)?;
    }

    for (i, row) in report.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, value) in row.values().iter().enumerate() {
            write_cell(worksheet, r, col as u16, value)?;
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();

    Ok(workbook)
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &Value) -> ReportResult<()> {
    match value {
        Value::Null => {}
        Value::Number(n) => match n.as_f64() {
            Some(f) => {
                sheet.write_number(row, col, f)?;
            }
            None => {
                sheet.write_string(row, col, n.to_string())?;
            }
        },
        Value::String(s) => {
            sheet.write_string(row, col, s)?;
        }
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        other => {
            sheet.write_string(row, col, other.to_string())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::pipeline::unify_tables;
    use crate::normalize::rules::RuleBook;
    use crate::models::RawTable;
    use serde_json::json;

    fn sample_report() -> UnifiedReport {
        let table = RawTable::from_records(vec![
            json!({"Fecha": "2024-03-15", "Cantidad": 4, "Unidad": "TONELADAS", "U$S FOB": 1000}),
            json!({"Cantidad": "n/d", "Unidad": "CAJAS"}),
        ]);
        unify_tables(vec![("detalle_AR_1.xlsx".into(), table)], &RuleBook::builtin()).unwrap()
    }

    #[test]
    fn test_csv_report() {
        let bytes = report_to_csv_bytes(&sample_report()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("Aplica?,País,Impo/Expo"));
        assert_eq!(header.split(',').count(), CANONICAL_COLUMNS.len());

        let first = lines.next().unwrap();
        assert!(first.starts_with("SI,Argentina,Importación,Silicato de Sodio,2024,3,2024.03,,15/03/2024"));

        // Missing cells stay empty, never "null"
        let second = lines.next().unwrap();
        assert!(second.starts_with("NO,Argentina"));
        assert!(!second.contains("null"));
    }

    #[test]
    fn test_xlsx_report() {
        use calamine::{open_workbook_auto, Data, Reader};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("importaciones_unificadas.xlsx");
        write_report(&sample_report(), &path).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec![SHEET_NAME.to_string()]);
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        let rows: Vec<&[Data]> = range.rows().collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].len(), CANONICAL_COLUMNS.len());
        assert_eq!(rows[0][0], Data::String("Aplica?".into()));
        assert_eq!(rows[1][1], Data::String("Argentina".into()));
        // Toneladas Finales is numeric
        let tonnes = CANONICAL_COLUMNS.iter().position(|c| *c == "Toneladas Finales").unwrap();
        assert_eq!(rows[1][tonnes], Data::Float(4.0));
        assert_eq!(rows[2][tonnes], Data::Empty);
    }

    #[test]
    fn test_xlsx_bytes() {
        let bytes = report_to_xlsx_bytes(&sample_report()).unwrap();
        // xlsx is a zip archive
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_report(&sample_report(), dir.path().join("out.json")).unwrap_err();
        assert!(matches!(err, ReportError::UnsupportedFormat(_)));
    }
}
