// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Roomport bridge.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Roomport configuration.
///
/// Loaded from a TOML file with `ROOMPORT_` environment variable overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoomportConfig {
    /// Homeserver connection settings.
    #[serde(default)]
    pub homeserver: HomeserverConfig,

    /// Application-service registration settings.
    #[serde(default)]
    pub appservice: AppserviceConfig,

    /// Bot identity and command authorization.
    #[serde(default)]
    pub bot: BotConfig,

    /// SQLite database and attachment download locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Import pipeline settings.
    #[serde(default)]
    pub import: ImportConfig,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RoomportConfig {
    fn default() -> Self {
        Self {
            homeserver: HomeserverConfig::default(),
            appservice: AppserviceConfig::default(),
            bot: BotConfig::default(),
            storage: StorageConfig::default(),
            import: ImportConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl RoomportConfig {
    /// Fully-qualified Matrix user id of the bot.
    pub fn bot_user_id(&self) -> String {
        format!("@{}:{}", self.bot.localpart, self.homeserver.server_name)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Homeserver connection configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HomeserverConfig {
    /// Base URL of the homeserver, e.g. `https://matrix.example.org`.
    #[serde(default)]
    pub url: String,

    /// Server name used in user ids, e.g. `example.org`.
    #[serde(default)]
    pub server_name: String,
}

/// Application-service registration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppserviceConfig {
    /// Appservice id from the registration file.
    #[serde(default = "default_as_id")]
    pub id: String,

    /// Token the homeserver presents on webhook pushes.
    #[serde(default)]
    pub hs_token: String,

    /// Token this service presents to the homeserver.
    #[serde(default)]
    pub as_token: String,

    /// Privileged token for the Synapse admin API (room deletion).
    #[serde(default)]
    pub admin_token: String,

    /// Host address to bind the webhook server.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind the webhook server.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for AppserviceConfig {
    fn default() -> Self {
        Self {
            id: default_as_id(),
            hs_token: String::new(),
            as_token: String::new(),
            admin_token: String::new(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_as_id() -> String {
    "roomport".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9024
}

/// Bot identity and command authorization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Localpart of the bot user id.
    #[serde(default = "default_localpart")]
    pub localpart: String,

    /// Displayname set on the bot profile at startup.
    #[serde(default = "default_displayname")]
    pub displayname: String,

    /// User ids allowed to drive the bot. Empty list rejects everyone.
    #[serde(default)]
    pub allow_users: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            localpart: default_localpart(),
            displayname: default_displayname(),
            allow_users: Vec::new(),
        }
    }
}

fn default_localpart() -> String {
    "roomport".to_string()
}

fn default_displayname() -> String {
    "Room Import".to_string()
}

/// Storage location configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory where uploaded export archives are downloaded to.
    #[serde(default = "default_import_dir")]
    pub import_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            import_dir: default_import_dir(),
        }
    }
}

fn default_database_path() -> String {
    "roomport.db".to_string()
}

fn default_import_dir() -> String {
    "imports".to_string()
}

/// Import pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    /// Destination space imported rooms are linked under. `None` skips the
    /// space link step. Mirrored into the config table at startup so runtime
    /// updates via the `space-id` command survive restart.
    #[serde(default)]
    pub space_id: Option<String>,
}
