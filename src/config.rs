//! Settings file support
//!
//! A settings file is TOML with an `[spi]` table using the same keys as the
//! device string:
//!
//! ```toml
//! [spi]
//! mode = 0
//! chipSelect = "none"
//! maxSpeed = 1000000
//! loopback = false
//! ```

use spilink_core::{SpiOptions, ValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors while loading a settings file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value has a type no setting accepts
    #[error("Unsupported value for '{key}': expected integer, boolean or string")]
    UnsupportedValue { key: String },

    /// A value is outside its valid domain
    #[error("Invalid setting: {0}")]
    Invalid(#[from] ValidationError),
}

/// Load settings from a TOML file
pub fn load_options(path: &Path) -> Result<SpiOptions, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = content
        .parse::<toml::Table>()
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let options = options_from_table(&table)?;
    log::debug!("Loaded settings from {}: {:?}", path.display(), options);
    Ok(options)
}

/// Build settings from the `[spi]` table of a parsed document
///
/// A document without an `[spi]` table yields an empty set.
pub fn options_from_table(table: &toml::Table) -> Result<SpiOptions, ConfigError> {
    let mut options = SpiOptions::new();
    let Some(spi) = table.get("spi").and_then(toml::Value::as_table) else {
        log::warn!("Settings file has no [spi] table");
        return Ok(options);
    };

    for (key, value) in spi {
        let text = match value {
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::String(s) => s.clone(),
            _ => return Err(ConfigError::UnsupportedValue { key: key.clone() }),
        };
        options.set_pair(key, &text)?;
    }
    Ok(options)
}
