//! Rule book: the immutable configuration of the normalization engine.
//!
//! A [`RuleBook`] bundles everything that varies by country:
//!
//! - the [`CountryCatalog`] (code <-> name)
//! - the commodity constants written into every row
//! - the [`FieldMappingTable`] for cost columns
//! - an ordered list of declarative [`CountryRule`]s
//!
//! Supporting a new country or a new export layout is a data change. The
//! rule book is loaded once per process and passed by reference.
//!
//! ```rust,ignore
//! use importaciones::RuleBook;
//!
//! let rules = RuleBook::builtin();
//! let json = rules.to_json()?;
//! let reloaded = RuleBook::from_json(&json)?;
//! ```

pub mod derivation;
pub mod mapping;

pub use derivation::{CountryRule, Derivation, RuleStage};
pub use mapping::{builtin_mappings, FieldMappingTable, COST_COLUMNS};

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

use crate::country::CountryCatalog;
use crate::error::{RuleBookError, RuleBookResult};
use crate::models::{canonical_index, columns};

/// The single commodity class this report covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    /// Written to `Producto`.
    pub product: String,
    /// Written to `Código NCM`.
    pub ncm_code: String,
}

impl Default for Commodity {
    fn default() -> Self {
        Self {
            product: "Silicato de Sodio".to_string(),
            ncm_code: "2839190000".to_string(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBook {
    /// Version of the rule book format
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    pub countries: CountryCatalog,

    #[serde(default)]
    pub commodity: Commodity,

    pub cost_mappings: FieldMappingTable,

    /// Applied in order within each stage.
    #[serde(default)]
    pub rules: Vec<CountryRule>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl RuleBook {
    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> RuleBookResult<Self> {
        let book: RuleBook = serde_json::from_str(json)?;
        book.validate()?;
        Ok(book)
    }

    /// Load a JSON rule book from disk.
    pub fn load(path: impl AsRef<Path>) -> RuleBookResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> RuleBookResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rules for one country and stage, in declaration order.
    pub fn rules_for<'a>(
        &'a self,
        country: &'a str,
        stage: RuleStage,
    ) -> impl Iterator<Item = &'a CountryRule> + 'a {
        self.rules
            .iter()
            .filter(move |r| r.country == country && r.stage == stage)
    }

    /// Check cross-references between the catalog, mappings and rules.
    pub fn validate(&self) -> RuleBookResult<()> {
        self.countries.validate()?;

        for country in self.cost_mappings.countries() {
            if self.countries.by_name(country).is_none() {
                return Err(RuleBookError::Invalid(format!(
                    "cost mapping for unknown country '{}'",
                    country
                )));
            }
            if let Some(entries) = self.cost_mappings.for_country(country) {
                for target in entries.keys() {
                    if !COST_COLUMNS.contains(&target.as_str()) {
                        return Err(RuleBookError::Invalid(format!(
                            "cost mapping target '{}' for {} is not a cost column",
                            target, country
                        )));
                    }
                }
            }
        }

        for (i, rule) in self.rules.iter().enumerate() {
            if self.countries.by_name(&rule.country).is_none() {
                return Err(RuleBookError::Invalid(format!(
                    "rule {} references unknown country '{}'",
                    i, rule.country
                )));
            }
            if canonical_index(&rule.target).is_none() {
                return Err(RuleBookError::Invalid(format!(
                    "rule {} targets non-canonical column '{}'",
                    i, rule.target
                )));
            }
            let needs_source = matches!(rule.derive, Derivation::Copy | Derivation::Map { .. });
            if needs_source && rule.sources.is_empty() {
                return Err(RuleBookError::Invalid(format!(
                    "rule {} ({} -> {}) has no source columns",
                    i, rule.country, rule.target
                )));
            }
        }

        Ok(())
    }

    /// The rule book observed across the nine supported customs exports.
    pub fn builtin() -> Self {
        use columns::{
            CIF_UNITARIO, DESCRIPCION_MERCADERIA, EMPRESA_TRANSPORTISTA, FOB_TOTAL, FOB_UNITARIO,
            IMPORTADOR, PAIS_PROCEDENCIA, PROVEEDOR, PUERTO_EMBARQUE, TONELADAS_FINALES,
            UNIDAD_MEDIDA,
        };

        let rules = vec![
            // Argentina
            CountryRule::ratio("Argentina", FOB_UNITARIO, FOB_TOTAL, TONELADAS_FINALES),
            CountryRule::copy("Argentina", DESCRIPCION_MERCADERIA, &["Descripción"]),
            // Bolivia exports carry no reliable unit field
            CountryRule::constant("Bolivia", UNIDAD_MEDIDA, json!("KILOGRAMOS"))
                .at_stage(RuleStage::Unit),
            CountryRule::copy("Bolivia", PAIS_PROCEDENCIA, &["País de Proveedor"]),
            CountryRule::copy("Bolivia", DESCRIPCION_MERCADERIA, &["Descripción Arancelaria"]),
            // Brasil
            CountryRule::map(
                "Brasil",
                UNIDAD_MEDIDA,
                &[UNIDAD_MEDIDA],
                &[("QUILOGRAMA LIQUIDO", "KILOGRAMOS")],
            )
            .at_stage(RuleStage::Unit),
            // Chile
            CountryRule::copy("Chile", PAIS_PROCEDENCIA, &["País de Adquisición"]),
            CountryRule::copy("Chile", EMPRESA_TRANSPORTISTA, &["Transportista"]),
            CountryRule::copy("Chile", CIF_UNITARIO, &["U$S Unitario"]),
            // Colombia
            CountryRule::copy("Colombia", EMPRESA_TRANSPORTISTA, &["Transportista"]),
            CountryRule::copy("Colombia", CIF_UNITARIO, &["CIF Unitario"]),
            CountryRule::copy("Colombia", DESCRIPCION_MERCADERIA, &["Descripción Arancelaria"]),
            // Ecuador
            CountryRule::copy("Ecuador", PAIS_PROCEDENCIA, &["País de Embarque"]),
            CountryRule::copy("Ecuador", PUERTO_EMBARQUE, &["Provincia"]),
            CountryRule::copy("Ecuador", EMPRESA_TRANSPORTISTA, &["Transportista"]),
            CountryRule::copy("Ecuador", CIF_UNITARIO, &["CIF Unitario"]),
            CountryRule::copy("Ecuador", DESCRIPCION_MERCADERIA, &["Descripción Comercial"]),
            // Paraguay
            CountryRule::copy("Paraguay", IMPORTADOR, &["Probable Importador"]),
            CountryRule::copy("Paraguay", PROVEEDOR, &["Probable Proveedor"]),
            CountryRule::copy("Paraguay", DESCRIPCION_MERCADERIA, &["Descripción"]),
            // Perú
            CountryRule::copy("Perú", PUERTO_EMBARQUE, &["Puerto"]),
            CountryRule::copy("Perú", EMPRESA_TRANSPORTISTA, &["Transportista"]),
            CountryRule::copy("Perú", CIF_UNITARIO, &["Unitario CIF"]),
            CountryRule::copy("Perú", DESCRIPCION_MERCADERIA, &["Descripción"]),
            // Uruguay
            CountryRule::copy("Uruguay", FOB_UNITARIO, &["Unitario VNA"]),
        ];

        RuleBook {
            version: default_version(),
            description: "Customs import detail exports, sodium silicate".to_string(),
            countries: CountryCatalog::builtin(),
            commodity: Commodity::default(),
            cost_mappings: builtin_mappings(),
            rules,
        }
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_is_valid() {
        let book = RuleBook::builtin();
        book.validate().unwrap();
        for country in book.countries.iter() {
            assert!(book.cost_mappings.contains_country(&country.name), "{}", country.name);
        }
    }

    #[test]
    fn test_json_round_trip() {
        let book = RuleBook::builtin();
        let json = book.to_json().unwrap();
        let parsed = RuleBook::from_json(&json).unwrap();
        assert_eq!(parsed, book);
    }

    #[test]
    fn test_rules_for_stage() {
        let book = RuleBook::builtin();
        let unit: Vec<_> = book.rules_for("Bolivia", RuleStage::Unit).collect();
        assert_eq!(unit.len(), 1);
        assert_eq!(unit[0].target, columns::UNIDAD_MEDIDA);

        let supplemental = book.rules_for("Bolivia", RuleStage::Supplemental).count();
        assert_eq!(supplemental, 2);
        assert_eq!(book.rules_for("Venezuela", RuleStage::Unit).count(), 0);
    }

    #[test]
    fn test_validate_rejects_unknown_country() {
        let mut book = RuleBook::builtin();
        book.rules.push(CountryRule::copy("Venezuela", columns::MARCA, &["Marca Comercial"]));
        let err = book.validate().unwrap_err();
        assert!(err.to_string().contains("Venezuela"));
    }

    #[test]
    fn test_validate_rejects_non_canonical_target() {
        let mut book = RuleBook::builtin();
        book.rules.push(CountryRule::copy("Chile", "Naviera", &["Transportista"]));
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_copy_without_sources() {
        let mut book = RuleBook::builtin();
        book.rules.push(CountryRule::copy("Chile", columns::MARCA, &[]));
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "countries": [{"code": "AR", "name": "Argentina"}],
            "cost_mappings": {"Argentina": {"FOB (Total)": "U$S FOB"}}
        }"#;
        let book = RuleBook::from_json(json).unwrap();
        assert_eq!(book.version, "1.0");
        assert_eq!(book.commodity.ncm_code, "2839190000");
        assert!(book.rules.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RuleBook::builtin().to_json().unwrap().as_bytes()).unwrap();

        let book = RuleBook::load(file.path()).unwrap();
        assert_eq!(book.countries.len(), 9);
    }
}
