//! Field mapping table.
//!
//! Per country, canonical cost column -> source column as named in that
//! country's export files. A missing entry is not an error: the canonical
//! column stays unset and is later completed with the missing marker.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::columns;

/// Canonical cost columns a mapping may target.
pub const COST_COLUMNS: [&str; 6] = [
    columns::FOB_TOTAL,
    columns::CIF_TOTAL,
    columns::FLETE_TOTAL,
    columns::SEGURO_TOTAL,
    columns::FOB_UNITARIO,
    columns::CIF_UNITARIO,
];

/// Country name -> (canonical column -> source column).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMappingTable {
    countries: BTreeMap<String, BTreeMap<String, String>>,
}

impl FieldMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) one mapping entry.
    pub fn insert(&mut self, country: &str, canonical: &str, source: &str) {
        self.countries
            .entry(country.to_string())
            .or_default()
            .insert(canonical.to_string(), source.to_string());
    }

    /// Builder form of [`insert`](Self::insert) for a whole country.
    pub fn with_country(mut self, country: &str, entries: &[(&str, &str)]) -> Self {
        self.countries.entry(country.to_string()).or_default();
        for (canonical, source) in entries {
            self.insert(country, canonical, source);
        }
        self
    }

    /// Source column feeding `canonical` for `country`, if defined.
    pub fn lookup(&self, country: &str, canonical: &str) -> Option<&str> {
        self.countries
            .get(country)
            .and_then(|m| m.get(canonical))
            .map(String::as_str)
    }

    /// All entries for a country; `None` if the country has no entry set.
    pub fn for_country(&self, country: &str) -> Option<&BTreeMap<String, String>> {
        self.countries.get(country)
    }

    pub fn contains_country(&self, country: &str) -> bool {
        self.countries.contains_key(country)
    }

    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.countries.keys().map(String::as_str)
    }
}

/// Cost mappings observed in each country's customs export.
pub fn builtin_mappings() -> FieldMappingTable {
    use columns::{CIF_TOTAL, FLETE_TOTAL, FOB_TOTAL, FOB_UNITARIO, SEGURO_TOTAL};

    FieldMappingTable::new()
        .with_country("Argentina", &[(FOB_TOTAL, "U$S FOB")])
        .with_country(
            "Bolivia",
            &[
                (FOB_TOTAL, "U$S FOB"),
                (CIF_TOTAL, "U$S CIF"),
                (FLETE_TOTAL, "Flete"),
                (SEGURO_TOTAL, "Seguro"),
            ],
        )
        .with_country(
            "Brasil",
            &[(FOB_TOTAL, "U$S FOB"), (FOB_UNITARIO, "Unitario FOB")],
        )
        .with_country(
            "Chile",
            &[
                (FOB_TOTAL, "FOB U$S"),
                (CIF_TOTAL, "U$S CIF"),
                (FLETE_TOTAL, "Flete U$S"),
                (SEGURO_TOTAL, "Seguro U$S"),
                (FOB_UNITARIO, "FOB Unitario U$S"),
            ],
        )
        .with_country(
            "Colombia",
            &[
                (FOB_TOTAL, "U$S FOB"),
                (CIF_TOTAL, "U$S CIF"),
                (FLETE_TOTAL, "Flete"),
                (SEGURO_TOTAL, "Seguro"),
                (FOB_UNITARIO, "FOB Unitario"),
            ],
        )
        .with_country(
            "Ecuador",
            &[
                (FOB_TOTAL, "U$S FOB"),
                (CIF_TOTAL, "U$S CIF"),
                (FLETE_TOTAL, "Flete"),
                (SEGURO_TOTAL, "Seguro"),
                (FOB_UNITARIO, "FOB Unitario"),
            ],
        )
        .with_country(
            "Perú",
            &[
                (FOB_TOTAL, "U$S FOB"),
                (CIF_TOTAL, "U$S CIF"),
                (FLETE_TOTAL, "Flete"),
                (FOB_UNITARIO, "Unitario FOB"),
            ],
        )
        .with_country(
            "Paraguay",
            &[
                (FOB_TOTAL, "U$S FOB"),
                (CIF_TOTAL, "U$S CIF"),
                (FLETE_TOTAL, "Flete"),
                (SEGURO_TOTAL, "Seguro"),
            ],
        )
        .with_country("Uruguay", &[(FOB_TOTAL, "U$S FOB")])
}
