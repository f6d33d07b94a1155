// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matrix client-server and Synapse admin API client for the Roomport
//! bridge.
//!
//! Provides the URL builders, wire types, inbound event classification, and
//! the [`MatrixClient`] used by the dispatcher and the import worker.

pub mod api;
pub mod client;
pub mod events;
pub mod types;

pub use client::MatrixClient;
pub use events::TimelineEvent;
pub use types::{
    ClientEvent, CreateRoomBody, CreationContent, DeleteRoomBody, MemberContent, Membership,
    MessageContent, ReactionContent, RelatesTo, StateEvent, Transaction,
};
