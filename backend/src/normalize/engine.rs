//! Normalization engine.
//!
//! Turns one [`RawTable`] plus its resolved [`Country`] into a
//! [`NormalizedTable`] with exactly the [`CANONICAL_COLUMNS`]. The steps run in
//! a fixed order because later steps read columns written by earlier ones:
//!
//! ```text
//! dates → fixed fields → transport → unit (+ unit rules) → quantity
//!       → tonnage → cost mapping → supplemental rules → Aplica? → projection
//! ```
//!
//! Data-shape problems never fail: absent columns and unreadable cells end up
//! as `Value::Null`. The only error is a country with no mapping entry.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{NormalizeError, NormalizeResult};
use crate::models::{columns, Country, NormalizedRow, NormalizedTable, RawTable, CANONICAL_COLUMNS};
use crate::normalize::rules::{RuleBook, RuleStage};
use crate::normalize::values::{
    cell_number, cell_text, classify_transport_cell, normalize_unit_cell, number_cell, parse_date,
    DateParts, TransportMode, UNIT_KILOGRAMS, UNIT_TONNES,
};

/// Date columns, in preference order.
pub const DATE_SOURCES: [&str; 2] = [columns::FECHA, "Fecha Canc."];

/// Free-text transport columns, in preference order.
pub const TRANSPORT_SOURCES: [&str; 2] = ["Transporte", columns::VIA_TRANSPORTE];

/// Unit columns, in preference order.
pub const UNIT_SOURCES: [&str; 2] = ["Unidad", columns::UNIDAD_MEDIDA];

/// Quantity columns, in preference order.
pub const QUANTITY_SOURCES: [&str; 2] = [columns::CANTIDAD_COMERCIAL, "Cantidad"];

/// Tonnage at or above which a row applies.
pub const APPLICABLE_MIN_TONNES: f64 = 1.0;

/// What the engine found while normalizing one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeTrace {
    /// Column the dates were read from.
    pub date_source: Option<String>,
    /// Cost columns populated: (canonical, source).
    pub mapped: Vec<(String, String)>,
    /// Cost columns whose source was absent: (canonical, source).
    pub unmapped: Vec<(String, String)>,
    /// Country rules that fired, as `target <- sources`.
    pub rules_fired: Vec<String>,
    /// Rows whose date could not be parsed.
    pub undated_rows: usize,
}

/// Runs the normalization steps against a borrowed [`RuleBook`].
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    rules: &'a RuleBook,
}

impl<'a> Normalizer<'a> {
    pub fn new(rules: &'a RuleBook) -> Self {
        Self { rules }
    }

    /// Normalize one table.
    pub fn normalize(&self, table: RawTable, country: &Country) -> NormalizeResult<NormalizedTable> {
        self.normalize_with_trace(table, country).map(|(t, _)| t)
    }

    /// Normalize one table and report what was mapped.
    pub fn normalize_with_trace(
        &self,
        mut table: RawTable,
        country: &Country,
    ) -> NormalizeResult<(NormalizedTable, NormalizeTrace)> {
        if !self.rules.cost_mappings.contains_country(&country.name) {
            return Err(NormalizeError::UnsupportedCountry(country.name.clone()));
        }

        let mut trace = NormalizeTrace::default();

        table.fill_column(columns::PAIS, json!(country.name));
        self.decompose_dates(&mut table, &mut trace);
        self.set_fixed_fields(&mut table);
        classify_transport_column(&mut table);
        normalize_unit_column(&mut table);
        self.apply_rules(&mut table, &country.name, RuleStage::Unit, &mut trace);
        resolve_quantity(&mut table);
        derive_tonnage(&mut table);
        self.map_cost_fields(&mut table, &country.name, &mut trace);
        self.apply_rules(&mut table, &country.name, RuleStage::Supplemental, &mut trace);
        flag_applicability(&mut table);

        let rows = table.rows.iter().map(NormalizedRow::project).collect();
        let normalized = NormalizedTable {
            country: country.clone(),
            rows,
        };

        Ok((normalized, trace))
    }

    fn decompose_dates(&self, table: &mut RawTable, trace: &mut NormalizeTrace) {
        let source = table.first_present(&DATE_SOURCES).map(str::to_string);
        let parts: Vec<Option<DateParts>> = match &source {
            Some(col) => table
                .column(col)
                .iter()
                .map(|v| parse_date(v).map(DateParts::from))
                .collect(),
            None => vec![None; table.len()],
        };

        trace.date_source = source;
        trace.undated_rows = parts.iter().filter(|p| p.is_none()).count();

        let pick = |f: fn(&DateParts) -> Value| -> Vec<Value> {
            parts
                .iter()
                .map(|p| p.as_ref().map(f).unwrap_or(Value::Null))
                .collect()
        };

        table.set_column(columns::ANIO, pick(|p| json!(p.year)));
        table.set_column(columns::MES, pick(|p| json!(p.month)));
        table.set_column(columns::ANIO_MES, pick(|p| json!(p.year_month)));
        table.set_column(columns::FECHA, pick(|p| json!(p.formatted)));
    }

    fn set_fixed_fields(&self, table: &mut RawTable) {
        table.fill_column(columns::IMPO_EXPO, json!("Importación"));
        table.fill_column(columns::PRODUCTO, json!(self.rules.commodity.product));
        table.fill_column(columns::CODIGO_NCM, json!(self.rules.commodity.ncm_code));
    }

    fn map_cost_fields(&self, table: &mut RawTable, country: &str, trace: &mut NormalizeTrace) {
        let Some(entries) = self.rules.cost_mappings.for_country(country) else {
            return;
        };

        for (target, source) in entries {
            if table.has_column(source) {
                table.copy_column(source, target);
                trace.mapped.push((target.clone(), source.clone()));
            } else {
                trace.unmapped.push((target.clone(), source.clone()));
            }
        }
    }

    fn apply_rules(
        &self,
        table: &mut RawTable,
        country: &str,
        stage: RuleStage,
        trace: &mut NormalizeTrace,
    ) {
        for rule in self.rules.rules_for(country, stage) {
            if rule.apply(table) {
                trace
                    .rules_fired
                    .push(format!("{} <- [{}]", rule.target, rule.sources.join(", ")));
            }
        }
    }
}

/// Normalize one table with the given rule book.
pub fn normalize_table(
    table: RawTable,
    country: &Country,
    rules: &RuleBook,
) -> NormalizeResult<NormalizedTable> {
    Normalizer::new(rules).normalize(table, country)
}

fn classify_transport_column(table: &mut RawTable) {
    match table.first_present(&TRANSPORT_SOURCES).map(str::to_string) {
        Some(source) => {
            let modes: Vec<Value> = table
                .column(&source)
                .iter()
                .map(|v| json!(classify_transport_cell(v).as_str()))
                .collect();
            table.set_column(columns::VIA_TRANSPORTE, modes);
        }
        None => table.fill_column(columns::VIA_TRANSPORTE, json!(TransportMode::Unknown.as_str())),
    }
}

fn normalize_unit_column(table: &mut RawTable) {
    match table.first_present(&UNIT_SOURCES).map(str::to_string) {
        Some(source) => {
            let units: Vec<Value> = table.column(&source).iter().map(normalize_unit_cell).collect();
            table.set_column(columns::UNIDAD_MEDIDA, units);
        }
        None => table.fill_column(columns::UNIDAD_MEDIDA, Value::Null),
    }
}

fn resolve_quantity(table: &mut RawTable) {
    match table.first_present(&QUANTITY_SOURCES).map(str::to_string) {
        Some(source) if source == columns::CANTIDAD_COMERCIAL => {}
        Some(source) => table.copy_column(&source, columns::CANTIDAD_COMERCIAL),
        None => table.fill_column(columns::CANTIDAD_COMERCIAL, Value::Null),
    }
}

/// Tonnes from quantity and unit; any unit other than tonnes or kilograms
/// leaves the row without tonnage.
pub fn tonnes_for(quantity: &Value, unit: &Value) -> Value {
    let Some(q) = cell_number(quantity) else {
        return Value::Null;
    };

    match cell_text(unit).as_deref() {
        Some(UNIT_TONNES) => number_cell(q),
        Some(UNIT_KILOGRAMS) => number_cell(q / 1000.0),
        _ => Value::Null,
    }
}

fn derive_tonnage(table: &mut RawTable) {
    let tonnes: Vec<Value> = (0..table.len())
        .map(|i| {
            tonnes_for(
                table.cell(i, columns::CANTIDAD_COMERCIAL),
                table.cell(i, columns::UNIDAD_MEDIDA),
            )
        })
        .collect();
    table.set_column(columns::TONELADAS_FINALES, tonnes);
}

/// `SI` when tonnage is known and at least one tonne, `NO` otherwise.
pub fn applicability(tonnes: &Value) -> &'static str {
    match cell_number(tonnes) {
        Some(t) if t >= APPLICABLE_MIN_TONNES => "SI",
        _ => "NO",
    }
}

fn flag_applicability(table: &mut RawTable) {
    let flags: Vec<Value> = table
        .column(columns::TONELADAS_FINALES)
        .iter()
        .map(|t| json!(applicability(t)))
        .collect();
    table.set_column(columns::APLICA, flags);
}

/// Column names of a normalized table, for callers that need headers.
pub fn output_headers() -> Vec<String> {
    CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect()
}
