// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store of controller rooms the bot has joined.
//!
//! Only messages arriving in one of these rooms are interpreted as bot
//! commands or import submissions.

use std::collections::BTreeMap;

use roomport_core::RoomportError;
use rusqlite::params;
use tokio::sync::Mutex;

use crate::database::{Database, map_tr_err};

/// Write-through cache over the `bot_rooms` table.
pub struct BotRoomStore {
    db: Database,
    cache: Mutex<BTreeMap<i64, String>>,
}

impl BotRoomStore {
    /// Load all rows into memory.
    pub async fn open(db: Database) -> Result<Self, RoomportError> {
        let rows = db
            .connection()
            .call(|conn| -> Result<Vec<(i64, String)>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT id, room_id FROM bot_rooms")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        Ok(Self {
            db,
            cache: Mutex::new(rows.into_iter().collect()),
        })
    }

    /// Record a newly joined controller room.
    pub async fn append(&self, room_id: &str) -> Result<i64, RoomportError> {
        let mut cache = self.cache.lock().await;
        let value = room_id.to_string();
        let id = self
            .db
            .connection()
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.execute("INSERT INTO bot_rooms (room_id) VALUES (?1)", params![value])?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(map_tr_err)?;
        cache.insert(id, room_id.to_string());
        Ok(id)
    }

    /// Remove a controller room by row id, returning the room id.
    ///
    /// A missing row is a hard error (double-delete).
    pub async fn pop(&self, id: i64) -> Result<String, RoomportError> {
        let mut cache = self.cache.lock().await;
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM bot_rooms WHERE id = ?1", params![id])
            })
            .await
            .map_err(map_tr_err)?;
        if removed == 0 {
            return Err(RoomportError::NotFound {
                what: "bot room row",
                key: id.to_string(),
            });
        }
        cache.remove(&id).ok_or(RoomportError::NotFound {
            what: "bot room row",
            key: id.to_string(),
        })
    }

    /// Whether the bot occupies the given room.
    pub async fn contains(&self, room_id: &str) -> bool {
        self.cache.lock().await.values().any(|r| r == room_id)
    }
}
