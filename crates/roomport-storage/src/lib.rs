// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Roomport bridge.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and the five durable stores behind
//! the dispatcher and import worker: handled transactions, controller rooms,
//! the FIFO import queue, rooms pending removal, and runtime config.

pub mod database;
pub mod migrations;
pub mod stores;

pub use database::Database;
pub use stores::{
    BotRoomStore, ConfigStore, ProcessJob, QueueStore, RemovalStore, RoomToRemove, SPACE_ID_KEY,
    StoreContext, TransactionStore,
};
