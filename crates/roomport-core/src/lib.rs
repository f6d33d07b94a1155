// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Roomport bridge.
//!
//! Provides the shared error type and the import concurrency gate used by
//! the webhook dispatcher (producer) and the import worker (consumer).

pub mod error;
pub mod gate;

pub use error::RoomportError;
pub use gate::ImportGate;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct_and_display() {
        let e = RoomportError::Matrix {
            errcode: "M_FORBIDDEN".into(),
            message: "denied".into(),
            status: 403,
        };
        assert_eq!(e.errcode(), Some("M_FORBIDDEN"));
        assert!(e.to_string().contains("M_FORBIDDEN"));

        let e = RoomportError::NotFound {
            what: "queue row",
            key: "42".into(),
        };
        assert!(e.errcode().is_none());
        assert!(e.to_string().contains("queue row"));
    }
}
