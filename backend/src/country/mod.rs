//! Country resolution.
//!
//! Input files are named `detalle_<CC>_<anything>.<ext>`. The first two
//! characters of the second `_`-delimited token, uppercased, select the
//! country in the [`CountryCatalog`].
//!
//! ```rust,ignore
//! use importaciones::CountryCatalog;
//!
//! let catalog = CountryCatalog::builtin();
//! let country = catalog.resolve_filename("detalle_cl_2024.xlsx", "detalle_")?;
//! assert_eq!(country.name, "Chile");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ResolveError, ResolveResult, RuleBookError, RuleBookResult};
use crate::models::Country;

/// Filename prefix every input file must carry.
pub const DEFAULT_FILENAME_PREFIX: &str = "detalle_";

/// Bijective code <-> name table of supported countries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryCatalog {
    countries: Vec<Country>,
}

impl CountryCatalog {
    /// Build a catalog, rejecting duplicate codes or names.
    pub fn new(countries: Vec<Country>) -> RuleBookResult<Self> {
        let catalog = Self { countries };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The nine supported South American markets.
    pub fn builtin() -> Self {
        let countries = [
            ("AR", "Argentina"),
            ("BO", "Bolivia"),
            ("BR", "Brasil"),
            ("CL", "Chile"),
            ("CO", "Colombia"),
            ("EC", "Ecuador"),
            ("PE", "Perú"),
            ("PY", "Paraguay"),
            ("UY", "Uruguay"),
        ]
        .into_iter()
        .map(|(code, name)| Country::new(code, name))
        .collect();

        Self { countries }
    }

    /// Check the catalog invariants.
    pub fn validate(&self) -> RuleBookResult<()> {
        let mut codes = HashSet::new();
        let mut names = HashSet::new();

        for country in &self.countries {
            let code_ok = country.code.len() == 2
                && country.code.chars().all(|c| c.is_ascii_uppercase());
            if !code_ok {
                return Err(RuleBookError::Invalid(format!(
                    "country code '{}' must be two uppercase letters",
                    country.code
                )));
            }
            if !codes.insert(country.code.as_str()) {
                return Err(RuleBookError::Invalid(format!(
                    "duplicate country code '{}'",
                    country.code
                )));
            }
            if !names.insert(country.name.as_str()) {
                return Err(RuleBookError::Invalid(format!(
                    "duplicate country name '{}'",
                    country.name
                )));
            }
        }

        Ok(())
    }

    /// Look up a code, case-insensitively.
    pub fn by_code(&self, code: &str) -> Option<&Country> {
        self.countries
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
    }

    /// Look up a display name.
    pub fn by_name(&self, name: &str) -> Option<&Country> {
        self.countries.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Country> {
        self.countries.iter()
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    /// Resolve the country a file belongs to from its name.
    ///
    /// Directory components are ignored. `prefix` may be empty to accept any
    /// first token.
    pub fn resolve_filename(&self, filename: &str, prefix: &str) -> ResolveResult<&Country> {
        let code = country_token(filename, prefix)?;
        self.by_code(&code)
            .ok_or_else(|| ResolveError::UnrecognizedCountry {
                filename: filename.to_string(),
                code,
            })
    }
}

/// Extract the uppercased country token from a filename.
///
/// Only the first two characters of the second `_` token are read.
pub fn country_token(filename: &str, prefix: &str) -> ResolveResult<String> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    if !name.starts_with(prefix) {
        return Err(ResolveError::MalformedFilename(filename.to_string()));
    }

    let token = name
        .split('_')
        .nth(1)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ResolveError::MalformedFilename(filename.to_string()))?;

    Ok(token.chars().take(2).collect::<String>().to_uppercase())
}
