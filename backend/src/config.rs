//! Process settings from the environment.
//!
//! | Variable                 | Default                  |
//! |--------------------------|--------------------------|
//! | `IMPORTACIONES_RULES`    | built-in rule book       |
//! | `IMPORTACIONES_PORT`     | `3000`                   |
//! | `IMPORTACIONES_DATA_DIR` | `./datos_importaciones`  |
//!
//! A `.env` file in the working directory is honored. Command-line flags
//! override these values.

use std::env;
use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};
use crate::normalize::rules::RuleBook;

pub const ENV_RULES: &str = "IMPORTACIONES_RULES";
pub const ENV_PORT: &str = "IMPORTACIONES_PORT";
pub const ENV_DATA_DIR: &str = "IMPORTACIONES_DATA_DIR";

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_DIR: &str = "datos_importaciones";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Rule book JSON; `None` means the built-in one.
    pub rules_path: Option<PathBuf>,
    pub port: u16,
    /// Folder scanned by `unify` when no files are given.
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rules_path: None,
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl Settings {
    /// Read settings from the process environment (and `.env`).
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(path) = get(ENV_RULES) {
            settings.rules_path = Some(PathBuf::from(path));
        }
        if let Some(port) = get(ENV_PORT) {
            settings.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_PORT.to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            settings.data_dir = PathBuf::from(dir);
        }

        Ok(settings)
    }

    /// Load the configured rule book, or the built-in one.
    pub fn load_rules(&self) -> ConfigResult<RuleBook> {
        match &self.rules_path {
            Some(path) => Ok(RuleBook::load(path)?),
            None => Ok(RuleBook::builtin()),
        }
    }
}
