// src/config/mod.rs

//! Configuration loading and validation for execlane.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate thresholds, property paths and scripts (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    NodeConfig, RawNodeConfig, ScriptSection, ShutdownSection, ThresholdSection, Thresholds,
};
pub use validate::validate_config;
