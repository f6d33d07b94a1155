// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes. Errors are collected, not fail-fast.

use crate::ConfigError;
use crate::model::RoomportConfig;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &RoomportConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.homeserver.url.trim().is_empty() {
        errors.push(validation("homeserver.url must not be empty"));
    } else if !config.homeserver.url.starts_with("http://")
        && !config.homeserver.url.starts_with("https://")
    {
        errors.push(validation(&format!(
            "homeserver.url `{}` must start with http:// or https://",
            config.homeserver.url
        )));
    }

    if config.homeserver.server_name.trim().is_empty() {
        errors.push(validation("homeserver.server_name must not be empty"));
    }

    for (field, value) in [
        ("appservice.hs_token", &config.appservice.hs_token),
        ("appservice.as_token", &config.appservice.as_token),
        ("appservice.admin_token", &config.appservice.admin_token),
    ] {
        if value.trim().is_empty() {
            errors.push(validation(&format!("{field} must not be empty")));
        }
    }

    if config.appservice.host.trim().is_empty() {
        errors.push(validation("appservice.host must not be empty"));
    }

    if config.bot.localpart.trim().is_empty() {
        errors.push(validation("bot.localpart must not be empty"));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(validation("storage.database_path must not be empty"));
    }

    if config.storage.import_dir.trim().is_empty() {
        errors.push(validation("storage.import_dir must not be empty"));
    }

    if let Some(space_id) = &config.import.space_id
        && !space_id.starts_with('!')
    {
        errors.push(validation(&format!(
            "import.space_id `{space_id}` is not a room id (expected a `!` prefix)"
        )));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validation(message: &str) -> ConfigError {
    ConfigError::Validation {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> RoomportConfig {
        crate::loader::load_config_from_str(
            r#"
            [homeserver]
            url = "https://matrix.example.org"
            server_name = "example.org"

            [appservice]
            hs_token = "hs"
            as_token = "as"
            admin_token = "admin"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn empty_tokens_are_collected() {
        let mut config = valid_config();
        config.appservice.hs_token = String::new();
        config.appservice.as_token = String::new();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn space_id_must_look_like_a_room_id() {
        let mut config = valid_config();
        config.import.space_id = Some("#alias:example.org".into());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn bad_url_scheme_is_rejected() {
        let mut config = valid_config();
        config.homeserver.url = "matrix.example.org".into();
        assert!(validate_config(&config).is_err());
    }
}
