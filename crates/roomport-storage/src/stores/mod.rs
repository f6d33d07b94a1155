// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable stores, one per table, each a write-through in-memory cache.
//!
//! Invariant shared by every store: a mutation commits to SQLite first and
//! updates the cache only afterwards, under the store's mutex. The cache is
//! the sole read path.

pub mod bot_rooms;
pub mod config;
pub mod queue;
pub mod removal;
pub mod transactions;

pub use bot_rooms::BotRoomStore;
pub use config::{ConfigStore, SPACE_ID_KEY};
pub use queue::{ProcessJob, QueueStore};
pub use removal::{RemovalStore, RoomToRemove};
pub use transactions::TransactionStore;

use roomport_core::RoomportError;

use crate::database::Database;

/// One instance of every store, constructed at startup and shared with the
/// dispatcher and the import worker. Replaces hidden singletons.
pub struct StoreContext {
    pub transactions: TransactionStore,
    pub bot_rooms: BotRoomStore,
    pub queue: QueueStore,
    pub removals: RemovalStore,
    pub config: ConfigStore,
}

impl StoreContext {
    /// Open all stores against the same database, materializing their
    /// caches.
    pub async fn open(db: &Database) -> Result<Self, RoomportError> {
        Ok(Self {
            transactions: TransactionStore::open(db.clone()).await?,
            bot_rooms: BotRoomStore::open(db.clone()).await?,
            queue: QueueStore::open(db.clone()).await?,
            removals: RemovalStore::open(db.clone()).await?,
            config: ConfigStore::open(db.clone()).await?,
        })
    }
}
