//! Value normalizers.
//!
//! Pure, total functions over single cells: transport classification, unit
//! normalization, and the tolerant date/number readers the engine relies on.
//! None of them fail; unreadable input maps to the missing marker
//! (`Value::Null`) or to [`TransportMode::Unknown`].

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Transport
// =============================================================================

/// Normalized transport mode written to `Vía Transporte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportMode {
    #[serde(rename = "Terrestre")]
    Land,
    #[serde(rename = "Marítimo")]
    Sea,
    #[serde(rename = "Aéreo")]
    Air,
    #[serde(rename = "No disponible")]
    Unknown,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Land => "Terrestre",
            TransportMode::Sea => "Marítimo",
            TransportMode::Air => "Aéreo",
            TransportMode::Unknown => "No disponible",
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const LAND_KEYWORDS: &[&str] = &["camión", "camion", "terrest", "ruta", "carretero"];
const SEA_KEYWORDS: &[&str] = &["mar", "acuático", "acuatico", "buque", "barco", "nav"];
const AIR_KEYWORDS: &[&str] = &["aer", "avión", "avion", "aéreo", "aereo"];

/// Classify a free-text transport description.
///
/// Case-insensitive substring match; land is checked before sea, sea before air.
pub fn classify_transport(text: &str) -> TransportMode {
    let lower = text.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if matches(LAND_KEYWORDS) {
        TransportMode::Land
    } else if matches(SEA_KEYWORDS) {
        TransportMode::Sea
    } else if matches(AIR_KEYWORDS) {
        TransportMode::Air
    } else {
        TransportMode::Unknown
    }
}

/// [`classify_transport`] over a cell; missing cells are `Unknown`.
pub fn classify_transport_cell(value: &Value) -> TransportMode {
    cell_text(value)
        .map(|s| classify_transport(&s))
        .unwrap_or(TransportMode::Unknown)
}

// =============================================================================
// Units
// =============================================================================

pub const UNIT_TONNES: &str = "TONELADAS";
pub const UNIT_KILOGRAMS: &str = "KILOGRAMOS";

const KILOGRAM_KEYWORDS: &[&str] = &["KILOGRAMO", "KILOS NETOS", "KG"];

/// Normalize a unit-of-measure string.
///
/// Input is trimmed and uppercased; anything that is neither tonnes nor
/// kilograms comes back in that uppercased form.
pub fn normalize_unit(text: &str) -> String {
    let upper = text.trim().to_uppercase();
    if upper.contains("TONELADA") {
        UNIT_TONNES.to_string()
    } else if KILOGRAM_KEYWORDS.iter().any(|k| upper.contains(k)) {
        UNIT_KILOGRAMS.to_string()
    } else {
        upper
    }
}

/// [`normalize_unit`] over a cell; missing stays missing.
pub fn normalize_unit_cell(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(normalize_unit(s)),
        other => Value::String(normalize_unit(&other.to_string())),
    }
}

// =============================================================================
// Cells
// =============================================================================

/// Text content of a cell; `None` for missing or blank cells.
pub fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric content of a cell; `None` when missing or not a number.
pub fn cell_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Wrap a float as a cell; non-finite values become missing.
pub fn number_cell(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Round half away from zero to `decimals` places.
pub fn round_to(n: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (n * factor).round() / factor
}

static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+|\d{1,3}([.,]\d{3})+)([.,]\d+)?$").expect("static pattern")
});

static DOT_GROUPED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?[1-9]\d{0,2}(\.\d{3})+$").expect("static pattern"));

/// True when `text` looks like a plain or grouped decimal number.
pub fn looks_numeric(text: &str) -> bool {
    NUMERIC_RE.is_match(text.trim())
}

/// Parse `1234.5`, `1.234,5`, `1,234.5` and `1234,5`.
///
/// With both separators present, the last one is the decimal mark. A single
/// separator is decimal unless it repeats.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if !looks_numeric(trimmed) {
        return None;
    }

    let last_dot = trimmed.rfind('.');
    let last_comma = trimmed.rfind(',');
    let cleaned = match (last_dot, last_comma) {
        (Some(d), Some(c)) if c > d => trimmed.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => trimmed.replace(',', ""),
        (None, Some(_)) if trimmed.matches(',').count() > 1 => trimmed.replace(',', ""),
        (None, Some(_)) => trimmed.replace(',', "."),
        (Some(_), None) if trimmed.matches('.').count() > 1 => trimmed.replace('.', ""),
        _ => trimmed.to_string(),
    };

    cleaned.parse::<f64>().ok()
}

/// [`parse_number`] for Latin exports, where `.` only groups thousands:
/// `1.500` is 1500 rather than 1.5.
pub fn parse_latin_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if DOT_GROUPED_RE.is_match(trimmed) {
        return trimmed.replace('.', "").parse::<f64>().ok();
    }
    parse_number(trimmed)
}

// =============================================================================
// Dates
// =============================================================================

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y%m%d",
];

/// Largest Excel serial we accept (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Parse a date cell.
///
/// Accepts ISO dates and datetimes, day-first `DD/MM/YYYY` style dates,
/// compact `YYYYMMDD` and Excel serial day numbers.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => {
            let n = n.as_f64()?;
            if (1.0..=MAX_EXCEL_SERIAL).contains(&n) {
                excel_serial_to_date(n)
            } else {
                parse_date_str(&n.to_string())
            }
        }
        Value::String(s) => parse_date_str(s),
        _ => None,
    }
}

/// Parse a date string; see [`parse_date`].
pub fn parse_date_str(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        })
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Calendar parts derived from a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParts {
    pub year: i32,
    pub month: u32,
    /// `YYYY.MM`
    pub year_month: String,
    /// `DD/MM/YYYY`
    pub formatted: String,
}

impl From<NaiveDate> for DateParts {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            year_month: date.format("%Y.%m").to_string(),
            formatted: date.format("%d/%m/%Y").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_transport() {
        assert_eq!(classify_transport("CAMION"), TransportMode::Land);
        assert_eq!(classify_transport("Carretero"), TransportMode::Land);
        assert_eq!(classify_transport("Marítimo"), TransportMode::Sea);
        assert_eq!(classify_transport("BUQUE"), TransportMode::Sea);
        assert_eq!(classify_transport("AÉREO"), TransportMode::Air);
        assert_eq!(classify_transport("Avion"), TransportMode::Air);
        assert_eq!(classify_transport("Ferroviario"), TransportMode::Unknown);
        assert_eq!(classify_transport(""), TransportMode::Unknown);
    }

    #[test]
    fn test_classify_transport_priority() {
        // "ruta" (land) wins over "mar" (sea) in the same text
        assert_eq!(classify_transport("ruta al mar"), TransportMode::Land);
        assert_eq!(classify_transport("naviera aerea"), TransportMode::Sea);
    }

    #[test]
    fn test_classify_transport_cell() {
        assert_eq!(classify_transport_cell(&Value::Null), TransportMode::Unknown);
        assert_eq!(classify_transport_cell(&json!(4)), TransportMode::Unknown);
        assert_eq!(classify_transport_cell(&json!("  Terrestre ")), TransportMode::Land);
        assert_eq!(TransportMode::Sea.to_string(), "Marítimo");
    }

    #[test]
    fn test_normalize_unit() {
        assert_eq!(normalize_unit("toneladas"), "TONELADAS");
        assert_eq!(normalize_unit(" Tonelada Métrica "), "TONELADAS");
        assert_eq!(normalize_unit("Kilogramo Bruto"), "KILOGRAMOS");
        assert_eq!(normalize_unit("kilos netos"), "KILOGRAMOS");
        assert_eq!(normalize_unit("kg"), "KILOGRAMOS");
        assert_eq!(normalize_unit(" litros "), "LITROS");
    }

    #[test]
    fn test_normalize_unit_cell_missing_passes_through() {
        assert_eq!(normalize_unit_cell(&Value::Null), Value::Null);
        assert_eq!(normalize_unit_cell(&json!("kg")), json!("KILOGRAMOS"));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1234.5"), Some(1234.5));
        assert_eq!(parse_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("1234,5"), Some(1234.5));
        assert_eq!(parse_number("1.234.567"), Some(1234567.0));
        assert_eq!(parse_number("-20"), Some(-20.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_parse_latin_number() {
        assert_eq!(parse_number("1.500"), Some(1.5));
        assert_eq!(parse_latin_number("1.500"), Some(1500.0));
        assert_eq!(parse_latin_number("-12.000"), Some(-12000.0));
        assert_eq!(parse_latin_number("1.500,25"), Some(1500.25));
        assert_eq!(parse_latin_number("0.500"), Some(0.5));
        assert_eq!(parse_latin_number("2,5"), Some(2.5));
        assert_eq!(parse_latin_number("1.5"), Some(1.5));
        assert_eq!(parse_latin_number("KG"), None);
    }

    #[test]
    fn test_cell_number() {
        assert_eq!(cell_number(&json!(12)), Some(12.0));
        assert_eq!(cell_number(&json!("3,5")), Some(3.5));
        assert_eq!(cell_number(&json!("n/d")), None);
        assert_eq!(cell_number(&Value::Null), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1000.0 / 3.0, 2), 333.33);
        assert_eq!(round_to(250.0, 2), 250.0);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        for text in [
            "2024-03-15",
            "2024-03-15 00:00:00",
            "2024-03-15T10:20:30",
            "15/03/2024",
            "15-03-2024",
            "2024/03/15",
            "20240315",
        ] {
            assert_eq!(parse_date(&json!(text)), Some(expected), "{text}");
        }
    }

    #[test]
    fn test_parse_date_excel_serial() {
        // 45366 is 2024-03-15 in the 1900 date system
        assert_eq!(
            parse_date(&json!(45366)),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            parse_date(&json!(20240315)),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
    }

    #[test]
    fn test_parse_date_invalid() {
        assert_eq!(parse_date(&json!("sin fecha")), None);
        assert_eq!(parse_date(&json!("31/02/2024")), None);
        assert_eq!(parse_date(&Value::Null), None);
    }

    #[test]
    fn test_date_parts() {
        let parts = DateParts::from(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(parts.year, 2024);
        assert_eq!(parts.month, 3);
        assert_eq!(parts.year_month, "2024.03");
        assert_eq!(parts.formatted, "05/03/2024");
    }
}
