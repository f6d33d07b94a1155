// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order: compiled defaults < `./roomport.toml` < `ROOMPORT_*`
//! environment variables. An explicit path passed on the command line
//! replaces the local-file layer.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RoomportConfig;

/// Load configuration from `./roomport.toml` with env var overrides.
pub fn load_config() -> Result<RoomportConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RoomportConfig::default()))
        .merge(Toml::file("roomport.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RoomportConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RoomportConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no file or env lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<RoomportConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RoomportConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `ROOMPORT_APPSERVICE_HS_TOKEN` must map
/// to `appservice.hs_token`, not `appservice.hs.token`.
fn env_provider() -> Env {
    const SECTIONS: &[&str] = &["homeserver", "appservice", "bot", "storage", "import"];

    Env::prefixed("ROOMPORT_").map(|key| {
        let key_str = key.as_str();
        for section in SECTIONS {
            // Anchored at the start: STORAGE_IMPORT_DIR must become
            // storage.import_dir, untouched by the import section.
            if let Some(rest) = key_str.strip_prefix(&format!("{section}_")) {
                return format!("{section}.{rest}").into();
            }
        }
        key_str.into()
    })
}
