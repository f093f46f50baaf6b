// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{NodeConfig, RawNodeConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawNodeConfig`.
///
/// This only performs TOML deserialization; it does **not** parse property
/// paths or compile scripts. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawNodeConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawNodeConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks thresholds and timeouts, parses property paths and compiles the
///   pre/post-processing scripts.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<NodeConfig> {
    let raw_config = load_from_path(&path)?;
    let config = NodeConfig::try_from(raw_config)?;
    Ok(config)
}

/// Default config location: `Execlane.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Execlane.toml")
}
