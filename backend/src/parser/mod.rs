//! Input readers: customs export files into [`RawTable`]s.
//!
//! CSV files get encoding and delimiter auto-detection; spreadsheets are read
//! through calamine (first worksheet, first row is the header). The format is
//! chosen by file extension.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::{json, Map, Value};
use std::io::Cursor;
use std::path::Path;

use crate::error::{ReadError, ReadResult};
use crate::models::RawTable;
use crate::normalize::values::{number_cell, parse_latin_number, parse_number};

/// How a file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Spreadsheet,
}

impl InputFormat {
    /// Pick the reader from the file extension (case-insensitive).
    pub fn from_filename(filename: &str) -> ReadResult<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(InputFormat::Csv),
            "xlsx" | "xls" | "xlsm" | "ods" => Ok(InputFormat::Spreadsheet),
            _ => Err(ReadError::UnsupportedFileFormat(filename.to_string())),
        }
    }
}

/// CSV parse result with the detected settings.
#[derive(Debug, Clone)]
pub struct CsvParse {
    pub table: RawTable,
    pub encoding: String,
    pub delimiter: char,
}

/// Read a file from disk.
pub fn read_file(path: impl AsRef<Path>) -> ReadResult<RawTable> {
    let path = path.as_ref();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    // Check the extension before touching the disk
    InputFormat::from_filename(&filename)?;
    let bytes = std::fs::read(path)?;
    read_table(&filename, &bytes)
}

/// Read in-memory file content; `filename` selects the format.
pub fn read_table(filename: &str, bytes: &[u8]) -> ReadResult<RawTable> {
    match InputFormat::from_filename(filename)? {
        InputFormat::Csv => parse_csv_bytes(bytes).map(|p| p.table),
        InputFormat::Spreadsheet => read_spreadsheet(bytes),
    }
}

// =============================================================================
// CSV
// =============================================================================

/// Detect the encoding of raw bytes.
///
/// Valid UTF-8 is always reported as `utf-8`; chardet only ranks the
/// legacy single-byte candidates.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes with the given encoding; a UTF-8 BOM is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> ReadResult<String> {
    let text = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            // chardet mislabels short Latin-1 files as UTF-8
            Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => match encoding_rs::Encoding::for_label(other.as_bytes()) {
                Some(enc) => enc.decode(bytes).0.into_owned(),
                None => {
                    return Err(ReadError::Encoding(format!("unknown encoding '{}'", encoding)));
                }
            },
        },
    };

    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ';';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_csv_bytes(bytes: &[u8]) -> ReadResult<CsvParse> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ReadError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let table = parse_csv_str(&content, delimiter)?;

    Ok(CsvParse {
        table,
        encoding,
        delimiter,
    })
}

/// Parse CSV text with an explicit delimiter.
///
/// Blank lines are skipped. Short records are padded with missing cells,
/// extra fields are ignored. A `;` delimiter marks a Latin export, whose
/// numbers group thousands with `.`.
pub fn parse_csv_str(content: &str, delimiter: char) -> ReadResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let raw_headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if raw_headers.iter().all(|h| h.is_empty()) {
        return Err(ReadError::NoHeaders);
    }
    let headers = dedupe_headers(raw_headers);

    let mut table = RawTable::new(headers);
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }

        let row: Map<String, Value> = table
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let cell = record.get(i).map(|f| csv_cell(f, delimiter)).unwrap_or(Value::Null);
                (h.clone(), cell)
            })
            .collect();
        table.rows.push(row);
    }

    Ok(table)
}

/// Typed value of one CSV field.
///
/// Empty is missing; numbers become numbers unless a leading zero marks them
/// as an identifier (`00123`). `delimiter` picks the number style.
pub fn csv_cell(field: &str, delimiter: char) -> Value {
    let text = field.trim();
    if text.is_empty() {
        return Value::Null;
    }

    let digits = text.trim_start_matches(&['+', '-'][..]);
    let identifier = digits.len() > 1
        && digits.starts_with('0')
        && !digits.starts_with("0.")
        && !digits.starts_with("0,");

    let number = if delimiter == ';' {
        parse_latin_number(text)
    } else {
        parse_number(text)
    };

    match number {
        Some(n) if !identifier => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                json!(n as i64)
            } else {
                number_cell(n)
            }
        }
        _ => Value::String(text.to_string()),
    }
}

// =============================================================================
// Spreadsheets
// =============================================================================

/// Read the first worksheet of an xlsx/xls/xlsm/ods workbook.
pub fn read_spreadsheet(bytes: &[u8]) -> ReadResult<RawTable> {
    if bytes.is_empty() {
        return Err(ReadError::EmptyFile);
    }

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ReadError::EmptyFile)?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range.rows();
    let header_row = rows.next().ok_or(ReadError::EmptyFile)?;
    let raw_headers: Vec<String> = header_row.iter().map(header_text).collect();
    if raw_headers.iter().all(|h| h.is_empty()) {
        return Err(ReadError::NoHeaders);
    }
    let headers = dedupe_headers(raw_headers);

    let mut table = RawTable::new(headers);
    for cells in rows {
        let values: Vec<Value> = cells.iter().map(spreadsheet_cell).collect();
        if values.iter().all(Value::is_null) {
            continue;
        }

        let row: Map<String, Value> = table
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), values.get(i).cloned().unwrap_or(Value::Null)))
            .collect();
        table.rows.push(row);
    }

    Ok(table)
}

fn header_text(cell: &Data) -> String {
    match spreadsheet_cell(cell) {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Typed value of one worksheet cell.
pub fn spreadsheet_cell(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::String(trimmed.to_string())
            }
        }
        Data::Float(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                json!(*n as i64)
            } else {
                number_cell(*n)
            }
        }
        Data::Int(n) => json!(n),
        Data::Bool(b) => Value::String(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(_) => Value::Null,
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => Value::String(ndt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => number_cell(dt.as_f64()),
        },
        Data::DateTimeIso(s) => Value::String(s.clone()),
        Data::DurationIso(s) => Value::String(s.clone()),
    }
}

/// Blank headers become `Unnamed: <i>`; repeats get a `.1`, `.2` suffix.
fn dedupe_headers(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (i, header) in raw.into_iter().enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {}", i)
        } else {
            header
        };

        let mut name = base.clone();
        let mut n = 1;
        while out.contains(&name) {
            name = format!("{}.{}", base, n);
            n += 1;
        }
        out.push(name);
    }
    out
}
