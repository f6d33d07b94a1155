// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Roomport bridge.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), environment variable overrides, and collected
//! validation errors.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::RoomportConfig;

use std::path::Path;

use thiserror::Error;

/// A configuration load or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML/env extraction failed.
    #[error("{0}")]
    Figment(#[from] Box<figment::Error>),

    /// A semantic constraint failed after deserialization.
    #[error("{message}")]
    Validation { message: String },
}

/// Load configuration and validate it.
///
/// With `Some(path)` only that file (plus env overrides) is consulted;
/// otherwise `./roomport.toml` is used.
pub fn load_and_validate(path: Option<&Path>) -> Result<RoomportConfig, Vec<ConfigError>> {
    let loaded = match path {
        Some(path) => loader::load_config_from_path(path),
        None => loader::load_config(),
    };
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(vec![ConfigError::Figment(Box::new(err))]),
    }
}

/// Print collected configuration errors to stderr.
pub fn render_errors(errors: &[ConfigError]) {
    eprintln!("error: invalid configuration ({} problem(s))", errors.len());
    for error in errors {
        eprintln!("  - {error}");
    }
}
