//! CLI configuration loaded from an optional TOML file.

use std::{fs, path::Path};

use escrow_core::Policy;
use serde::Deserialize;

use crate::errors::{CliError, Result};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "ESCROW_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Validator switches, see `[policy]`.
    pub policy: Policy,
}

impl Config {
    /// Reads `path` when given, otherwise falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}
