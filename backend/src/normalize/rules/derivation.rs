//! Derivations applied by per-country rules.
//!
//! A [`CountryRule`] names a target column and the source columns it may read;
//! its [`Derivation`] says how the target is computed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::models::RawTable;
use crate::normalize::values::{cell_number, cell_text, number_cell, round_to};

/// When a rule runs inside the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStage {
    /// Right after unit normalization, before tonnage is derived.
    Unit,
    /// After the generic cost-field mapping.
    #[default]
    Supplemental,
}

/// How a rule computes its target column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Derivation {
    /// Copy the first present source column.
    #[default]
    Copy,

    /// Fill the target with a fixed value.
    Constant { value: Value },

    /// Look the first present source column up in a table; unmatched cells are kept.
    Map {
        mapping: HashMap<String, String>,
        #[serde(default)]
        case_insensitive: bool,
    },

    /// `round(numerator / denominator, decimals)` per row.
    ///
    /// Runs only while the target column is absent or entirely missing. Rows
    /// with a missing, non-numeric or zero denominator get the missing marker.
    Ratio {
        numerator: String,
        denominator: String,
        #[serde(default = "default_decimals")]
        decimals: u32,
    },
}

fn default_decimals() -> u32 {
    2
}

/// One declarative per-country rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRule {
    /// Country display name the rule applies to.
    pub country: String,
    /// Canonical column written by the rule.
    pub target: String,
    /// Candidate source columns, first present wins.
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub derive: Derivation,
    #[serde(default)]
    pub stage: RuleStage,
}

impl CountryRule {
    /// Copy rule: `target` from the first present of `sources`.
    pub fn copy(country: &str, target: &str, sources: &[&str]) -> Self {
        Self {
            country: country.to_string(),
            target: target.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            derive: Derivation::Copy,
            stage: RuleStage::Supplemental,
        }
    }

    /// Constant rule without source columns.
    pub fn constant(country: &str, target: &str, value: Value) -> Self {
        Self {
            country: country.to_string(),
            target: target.to_string(),
            sources: Vec::new(),
            derive: Derivation::Constant { value },
            stage: RuleStage::Supplemental,
        }
    }

    /// Lookup rule over the first present of `sources`.
    pub fn map(country: &str, target: &str, sources: &[&str], mapping: &[(&str, &str)]) -> Self {
        Self {
            country: country.to_string(),
            target: target.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            derive: Derivation::Map {
                mapping: mapping
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                case_insensitive: true,
            },
            stage: RuleStage::Supplemental,
        }
    }

    /// Ratio rule rounded to two decimals.
    pub fn ratio(country: &str, target: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            country: country.to_string(),
            target: target.to_string(),
            sources: Vec::new(),
            derive: Derivation::Ratio {
                numerator: numerator.to_string(),
                denominator: denominator.to_string(),
                decimals: default_decimals(),
            },
            stage: RuleStage::Supplemental,
        }
    }

    /// Move the rule to another stage.
    pub fn at_stage(mut self, stage: RuleStage) -> Self {
        self.stage = stage;
        self
    }

    /// Apply the rule to `table`. Returns whether it fired.
    ///
    /// A rule with sources fires only when one of them is a column of the
    /// table; absence is skipped silently.
    pub fn apply(&self, table: &mut RawTable) -> bool {
        let source = match table.first_present(&self.sources) {
            Some(s) => Some(s.to_string()),
            None if self.sources.is_empty() => None,
            None => return false,
        };

        match &self.derive {
            Derivation::Copy => match source {
                Some(src) => {
                    table.copy_column(&src, &self.target);
                    true
                }
                None => false,
            },

            Derivation::Constant { value } => {
                table.fill_column(&self.target, value.clone());
                true
            }

            Derivation::Map {
                mapping,
                case_insensitive,
            } => match source {
                Some(src) => {
                    let mapped: Vec<Value> = table
                        .column(&src)
                        .into_iter()
                        .map(|v| map_cell(v, mapping, *case_insensitive))
                        .collect();
                    table.set_column(&self.target, mapped);
                    true
                }
                None => false,
            },

            Derivation::Ratio {
                numerator,
                denominator,
                decimals,
            } => {
                let populated = table.has_column(&self.target)
                    && table.column(&self.target).iter().any(|v| !v.is_null());
                if populated {
                    return false;
                }

                let values: Vec<Value> = (0..table.len())
                    .map(|i| {
                        let num = cell_number(table.cell(i, numerator));
                        let den = cell_number(table.cell(i, denominator));
                        match (num, den) {
                            (Some(n), Some(d)) if d != 0.0 => number_cell(round_to(n / d, *decimals)),
                            _ => Value::Null,
                        }
                    })
                    .collect();
                table.set_column(&self.target, values);
                true
            }
        }
    }
}

fn map_cell(value: Value, mapping: &HashMap<String, String>, case_insensitive: bool) -> Value {
    let Some(text) = cell_text(&value) else {
        return value;
    };

    let found = if case_insensitive {
        mapping
            .iter()
            .find(|(k, _)| k.to_lowercase() == text.to_lowercase())
            .map(|(_, v)| v)
    } else {
        mapping.get(&text)
    };

    match found {
        Some(v) => Value::String(v.clone()),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(records: Vec<Value>) -> RawTable {
        RawTable::from_records(records)
    }

    #[test]
    fn test_copy_first_present_source() {
        let mut t = table(vec![json!({"Transportista": "ACME", "Otro": 1})]);
        let rule = CountryRule::copy("Chile", "Empresa Transportista", &["Naviera", "Transportista"]);
        assert!(rule.apply(&mut t));
        assert_eq!(t.cell(0, "Empresa Transportista"), &json!("ACME"));
    }

    #[test]
    fn test_copy_absent_source_is_skipped() {
        let mut t = table(vec![json!({"Otro": 1})]);
        let rule = CountryRule::copy("Chile", "Empresa Transportista", &["Transportista"]);
        assert!(!rule.apply(&mut t));
        assert!(!t.has_column("Empresa Transportista"));
    }

    #[test]
    fn test_constant() {
        let mut t = table(vec![json!({"Unidad": "LITROS"}), json!({"Unidad": null})]);
        let rule = CountryRule::constant("Bolivia", "Unidad de Medida", json!("KILOGRAMOS"));
        assert!(rule.apply(&mut t));
        assert_eq!(t.column("Unidad de Medida"), vec![json!("KILOGRAMOS"), json!("KILOGRAMOS")]);
    }

    #[test]
    fn test_map_keeps_unmatched() {
        let mut t = table(vec![
            json!({"Unidad de Medida": "QUILOGRAMA LIQUIDO"}),
            json!({"Unidad de Medida": "LITROS"}),
            json!({"Unidad de Medida": null}),
        ]);
        let rule = CountryRule::map(
            "Brasil",
            "Unidad de Medida",
            &["Unidad de Medida"],
            &[("quilograma liquido", "KILOGRAMOS")],
        );
        assert!(rule.apply(&mut t));
        assert_eq!(
            t.column("Unidad de Medida"),
            vec![json!("KILOGRAMOS"), json!("LITROS"), Value::Null]
        );
    }

    #[test]
    fn test_ratio() {
        let mut t = table(vec![
            json!({"FOB (Total)": 1000, "Toneladas Finales": 4}),
            json!({"FOB (Total)": 1000, "Toneladas Finales": 0}),
            json!({"FOB (Total)": 1000, "Toneladas Finales": null}),
            json!({"FOB (Total)": 1000, "Toneladas Finales": 3}),
        ]);
        let rule = CountryRule::ratio("Argentina", "FOB (Unitario Tn)", "FOB (Total)", "Toneladas Finales");
        assert!(rule.apply(&mut t));
        let values = t.column("FOB (Unitario Tn)");
        assert_eq!(values[0].as_f64(), Some(250.0));
        assert_eq!(values[1], Value::Null);
        assert_eq!(values[2], Value::Null);
        assert_eq!(values[3].as_f64(), Some(333.33));
    }

    #[test]
    fn test_ratio_respects_populated_target() {
        let mut t = table(vec![json!({
            "FOB (Total)": 1000,
            "Toneladas Finales": 4,
            "FOB (Unitario Tn)": 99
        })]);
        let rule = CountryRule::ratio("Argentina", "FOB (Unitario Tn)", "FOB (Total)", "Toneladas Finales");
        assert!(!rule.apply(&mut t));
        assert_eq!(t.cell(0, "FOB (Unitario Tn)"), &json!(99));

        // An all-missing target column counts as unpopulated
        let mut t = table(vec![json!({
            "FOB (Total)": 1000,
            "Toneladas Finales": 4,
            "FOB (Unitario Tn)": null
        })]);
        assert!(rule.apply(&mut t));
        assert_eq!(t.cell(0, "FOB (Unitario Tn)").as_f64(), Some(250.0));
    }

    #[test]
    fn test_rule_json_shape() {
        let json = json!({
            "country": "Uruguay",
            "target": "FOB (Unitario Tn)",
            "sources": ["Unitario VNA"]
        });
        let rule: CountryRule = serde_json::from_value(json).unwrap();
        assert_eq!(rule.derive, Derivation::Copy);
        assert_eq!(rule.stage, RuleStage::Supplemental);

        let json = json!({
            "country": "Bolivia",
            "target": "Unidad de Medida",
            "derive": {"type": "constant", "value": "KILOGRAMOS"},
            "stage": "unit"
        });
        let rule: CountryRule = serde_json::from_value(json).unwrap();
        assert_eq!(rule.stage, RuleStage::Unit);
        assert!(matches!(rule.derive, Derivation::Constant { .. }));
    }
}
