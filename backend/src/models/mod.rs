//! Domain models for the import unification pipeline.
//!
//! - [`Country`] - a supported country (two-letter code and display name)
//! - [`RawTable`] - one parsed input file, rows keyed by source column name
//! - [`NormalizedRow`] - one output row aligned with [`CANONICAL_COLUMNS`]
//! - [`NormalizedTable`] - the engine output for one input file
//!
//! Cells are [`serde_json::Value`]s. `Value::Null` is the missing marker and
//! stays distinct from `0` and from `""`.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

// =============================================================================
// Canonical Schema
// =============================================================================

/// Canonical column names.
pub mod columns {
    pub const APLICA: &str = "Aplica?";
    pub const PAIS: &str = "País";
    pub const IMPO_EXPO: &str = "Impo/Expo";
    pub const PRODUCTO: &str = "Producto";
    pub const ANIO: &str = "Año";
    pub const MES: &str = "Mes";
    pub const ANIO_MES: &str = "Año.Mes";
    pub const DUA: &str = "DUA";
    pub const FECHA: &str = "Fecha";
    pub const CODIGO_NCM: &str = "Código NCM";
    pub const PAIS_ORIGEN: &str = "País de Origen";
    pub const PAIS_PROCEDENCIA: &str = "País de Procedencia";
    pub const ADUANA: &str = "Aduana";
    pub const PUERTO_EMBARQUE: &str = "Puerto de Embarque";
    pub const VIA_TRANSPORTE: &str = "Vía Transporte";
    pub const EMPRESA_TRANSPORTISTA: &str = "Empresa Transportista";
    pub const FOB_TOTAL: &str = "FOB (Total)";
    pub const CIF_TOTAL: &str = "CIF (Total)";
    pub const FOB_UNITARIO: &str = "FOB (Unitario Tn)";
    pub const CIF_UNITARIO: &str = "CIF (Unitario Tn)";
    pub const FLETE_TOTAL: &str = "Flete (Total)";
    pub const SEGURO_TOTAL: &str = "Seguro (Total)";
    pub const CANTIDAD_COMERCIAL: &str = "Cantidad Comercial";
    pub const UNIDAD_MEDIDA: &str = "Unidad de Medida";
    pub const TONELADAS_FINALES: &str = "Toneladas Finales";
    pub const IMPORTADOR: &str = "Importador";
    pub const PROVEEDOR: &str = "Proveedor";
    pub const MARCA: &str = "Marca";
    pub const DESCRIPCION_MERCADERIA: &str = "Descripción de Mercadería";
}

/// Output columns, in output order.
pub const CANONICAL_COLUMNS: [&str; 29] = [
    columns::APLICA,
    columns::PAIS,
    columns::IMPO_EXPO,
    columns::PRODUCTO,
    columns::ANIO,
    columns::MES,
    columns::ANIO_MES,
    columns::DUA,
    columns::FECHA,
    columns::CODIGO_NCM,
    columns::PAIS_ORIGEN,
    columns::PAIS_PROCEDENCIA,
    columns::ADUANA,
    columns::PUERTO_EMBARQUE,
    columns::VIA_TRANSPORTE,
    columns::EMPRESA_TRANSPORTISTA,
    columns::FOB_TOTAL,
    columns::CIF_TOTAL,
    columns::FOB_UNITARIO,
    columns::CIF_UNITARIO,
    columns::FLETE_TOTAL,
    columns::SEGURO_TOTAL,
    columns::CANTIDAD_COMERCIAL,
    columns::UNIDAD_MEDIDA,
    columns::TONELADAS_FINALES,
    columns::IMPORTADOR,
    columns::PROVEEDOR,
    columns::MARCA,
    columns::DESCRIPCION_MERCADERIA,
];

/// Position of a canonical column, if `name` is one.
pub fn canonical_index(name: &str) -> Option<usize> {
    CANONICAL_COLUMNS.iter().position(|c| *c == name)
}

// =============================================================================
// Country
// =============================================================================

/// A supported country.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Country {
    /// Two-letter uppercase code (`AR`, `BO`, ...).
    pub code: String,
    /// Display name written into the `País` column.
    pub name: String,
}

impl Country {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

// =============================================================================
// Raw Table
// =============================================================================

/// One parsed input file.
///
/// `headers` keeps the file's column order; each row maps header to cell.
/// A header may be present while a given row holds `Value::Null` for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Build a table from JSON objects; headers are collected in first-seen order.
    pub fn from_records(records: Vec<Value>) -> Self {
        let mut table = RawTable::default();
        for record in records {
            if let Value::Object(obj) = record {
                for key in obj.keys() {
                    if !table.has_column(key) {
                        table.headers.push(key.clone());
                    }
                }
                table.rows.push(obj);
            }
        }
        table
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// First of `candidates` that is a column of this table.
    pub fn first_present<'a>(&self, candidates: &'a [impl AsRef<str>]) -> Option<&'a str> {
        candidates
            .iter()
            .map(|c| c.as_ref())
            .find(|c: &&str| self.has_column(c))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at (`row`, `column`); missing header or cell reads as `Null`.
    pub fn cell(&self, row: usize, column: &str) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&Value::Null)
    }

    /// Values of one column, `Null` where a row lacks it.
    pub fn column(&self, column: &str) -> Vec<Value> {
        (0..self.rows.len())
            .map(|i| self.cell(i, column).clone())
            .collect()
    }

    /// Replace (or create) a column with the given per-row values.
    ///
    /// Rows beyond the end of `values` receive `Null`.
    pub fn set_column(&mut self, column: &str, values: impl IntoIterator<Item = Value>) {
        if !self.has_column(column) {
            self.headers.push(column.to_string());
        }
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.insert(column.to_string(), values.next().unwrap_or(Value::Null));
        }
    }

    /// Set every row of `column` to `value`.
    pub fn fill_column(&mut self, column: &str, value: Value) {
        let n = self.rows.len();
        self.set_column(column, std::iter::repeat(value).take(n));
    }

    /// Copy `source` into `target` row by row.
    pub fn copy_column(&mut self, source: &str, target: &str) {
        let values = self.column(source);
        self.set_column(target, values);
    }
}

// =============================================================================
// Normalized Output
// =============================================================================

/// One output row, one cell per entry of [`CANONICAL_COLUMNS`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    values: Vec<Value>,
}

impl NormalizedRow {
    /// Project a row map onto the canonical schema, dropping extra keys.
    pub fn project(row: &Map<String, Value>) -> Self {
        let values = CANONICAL_COLUMNS
            .iter()
            .map(|c| row.get(*c).cloned().unwrap_or(Value::Null))
            .collect();
        Self { values }
    }

    /// Cell for a canonical column; `None` if `column` is not canonical.
    pub fn get(&self, column: &str) -> Option<&Value> {
        canonical_index(column).and_then(|i| self.values.get(i))
    }

    /// Cells in canonical order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Row as an ordered JSON object.
    pub fn to_object(&self) -> Map<String, Value> {
        CANONICAL_COLUMNS
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.to_string(), v.clone()))
            .collect()
    }
}

impl Serialize for NormalizedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in CANONICAL_COLUMNS.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Engine output for one input file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTable {
    pub country: Country,
    pub rows: Vec<NormalizedRow>,
}

impl NormalizedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Turn the output back into a raw table with canonical headers.
    pub fn to_raw(&self) -> RawTable {
        RawTable {
            headers: CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: self.rows.iter().map(NormalizedRow::to_object).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_columns_unique() {
        let mut seen = std::collections::HashSet::new();
        for c in CANONICAL_COLUMNS {
            assert!(seen.insert(c), "duplicate column {c}");
        }
        assert_eq!(CANONICAL_COLUMNS[0], "Aplica?");
        assert_eq!(CANONICAL_COLUMNS[28], "Descripción de Mercadería");
    }

    #[test]
    fn test_raw_table_from_records() {
        let table = RawTable::from_records(vec![
            json!({"a": 1, "b": "x"}),
            json!({"a": 2, "c": null}),
        ]);
        assert_eq!(table.headers, vec!["a", "b", "c"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, "b"), &Value::Null);
        assert_eq!(table.cell(5, "a"), &Value::Null);
    }

    #[test]
    fn test_set_and_copy_column() {
        let mut table = RawTable::from_records(vec![json!({"a": 1}), json!({"a": 2})]);
        table.copy_column("a", "b");
        assert!(table.has_column("b"));
        assert_eq!(table.column("b"), vec![json!(1), json!(2)]);

        table.fill_column("c", json!("x"));
        assert_eq!(table.column("c"), vec![json!("x"), json!("x")]);

        table.set_column("d", vec![json!(true)]);
        assert_eq!(table.column("d"), vec![json!(true), Value::Null]);
    }

    #[test]
    fn test_first_present() {
        let table = RawTable::new(vec!["Cantidad".into()]);
        assert_eq!(table.first_present(&["Cantidad Comercial", "Cantidad"]), Some("Cantidad"));
        assert_eq!(table.first_present(&["Unidad"]), None);
    }

    #[test]
    fn test_project_drops_extra_and_orders() {
        let mut row = Map::new();
        row.insert("Extra".into(), json!("drop me"));
        row.insert("País".into(), json!("Chile"));
        row.insert("Aplica?".into(), json!("SI"));

        let projected = NormalizedRow::project(&row);
        assert_eq!(projected.values().len(), CANONICAL_COLUMNS.len());
        assert_eq!(projected.values()[0], json!("SI"));
        assert_eq!(projected.get("País"), Some(&json!("Chile")));
        assert_eq!(projected.get("Marca"), Some(&Value::Null));
        assert_eq!(projected.get("Extra"), None);
    }

    #[test]
    fn test_row_serializes_in_canonical_order() {
        let row = NormalizedRow::project(&Map::new());
        let json = serde_json::to_string(&row).unwrap();
        let aplica = json.find("Aplica?").unwrap();
        let marca = json.find("Marca").unwrap();
        assert!(aplica < marca);
    }
}
