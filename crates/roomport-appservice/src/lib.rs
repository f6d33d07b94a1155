// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Appservice webhook server and transaction dispatcher for the Roomport
//! bridge.
//!
//! The dispatcher deduplicates homeserver-pushed transactions, classifies
//! their events, and routes them: invite-accept, bot commands, export
//! submissions (enqueued for the import worker), and removal confirmations.

pub mod commands;
pub mod dispatcher;
pub mod removal;
pub mod server;

pub use dispatcher::{AppState, DispatcherSettings};
pub use server::start_server;
