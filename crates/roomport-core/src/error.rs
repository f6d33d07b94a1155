// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Roomport bridge.

use thiserror::Error;

/// The primary error type used across all Roomport crates.
#[derive(Debug, Error)]
pub enum RoomportError {
    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database open, query failure, migration failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A row or key that must exist was absent (double-pop, update of an
    /// unknown config key). Distinct from soft "value not present" cases,
    /// which surface as `Option::None` on the read paths.
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// A known payload shape failed validation (e.g. a member event without
    /// a membership field). Distinct from "simply unknown type", which
    /// decodes into a generic fallback variant instead.
    #[error("validation error: {0}")]
    Validation(String),

    /// The homeserver answered with a Matrix error payload.
    #[error("matrix error {status} {errcode}: {message}")]
    Matrix {
        errcode: String,
        message: String,
        status: u16,
    },

    /// Transport-level HTTP failure (connect, timeout, undecodable body).
    #[error("http error: {message}")]
    Http {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RoomportError {
    /// The Matrix protocol error code, when this is a remote API error.
    pub fn errcode(&self) -> Option<&str> {
        match self {
            RoomportError::Matrix { errcode, .. } => Some(errcode),
            _ => None,
        }
    }
}
