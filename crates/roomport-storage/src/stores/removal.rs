// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store of old rooms awaiting deletion confirmation.
//!
//! An entry is created when an import finishes and consumed when the
//! requesting user confirms in the status thread. Lookup is by the embedded
//! notice event id, not the row id: an incoming confirmation reply only
//! carries the event id it references.

use std::collections::BTreeMap;

use roomport_core::RoomportError;
use rusqlite::params;
use tokio::sync::Mutex;

use crate::database::{Database, map_tr_err};

/// An old room that may be purged once the user confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomToRemove {
    /// Event id of the "import finished" notice whose thread carries the
    /// confirmation.
    pub event_id: String,
    /// The old room to purge.
    pub room_id: String,
    /// Users joined in the old room at export time. They are evicted before
    /// deletion since the server may refuse to purge a room with active
    /// members.
    pub users: Vec<String>,
}

/// Write-through cache over the `rooms_to_remove` table.
///
/// The user list is persisted comma-joined in a single column.
pub struct RemovalStore {
    db: Database,
    cache: Mutex<BTreeMap<i64, RoomToRemove>>,
}

impl RemovalStore {
    /// Load all rows into memory.
    pub async fn open(db: Database) -> Result<Self, RoomportError> {
        let rows = db
            .connection()
            .call(|conn| -> Result<Vec<(i64, String, String, String)>, rusqlite::Error> {
                let mut stmt = conn
                    .prepare("SELECT id, event_id, room_id, users FROM rooms_to_remove")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        let cache = rows
            .into_iter()
            .map(|(id, event_id, room_id, users)| {
                (
                    id,
                    RoomToRemove {
                        event_id,
                        room_id,
                        users: split_users(&users),
                    },
                )
            })
            .collect();

        Ok(Self {
            db,
            cache: Mutex::new(cache),
        })
    }

    /// Register an old room pending confirmation.
    pub async fn append(&self, entry: RoomToRemove) -> Result<i64, RoomportError> {
        let mut cache = self.cache.lock().await;
        let event_id = entry.event_id.clone();
        let room_id = entry.room_id.clone();
        let users = entry.users.join(",");
        let id = self
            .db
            .connection()
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO rooms_to_remove (event_id, room_id, users) VALUES (?1, ?2, ?3)",
                    params![event_id, room_id, users],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(map_tr_err)?;
        cache.insert(id, entry);
        Ok(id)
    }

    /// Remove an entry by row id. A missing row is a hard error.
    pub async fn pop(&self, id: i64) -> Result<RoomToRemove, RoomportError> {
        let mut cache = self.cache.lock().await;
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM rooms_to_remove WHERE id = ?1", params![id])
            })
            .await
            .map_err(map_tr_err)?;
        if removed == 0 {
            return Err(RoomportError::NotFound {
                what: "removal row",
                key: id.to_string(),
            });
        }
        cache.remove(&id).ok_or(RoomportError::NotFound {
            what: "removal row",
            key: id.to_string(),
        })
    }

    /// Find the entry whose notice event id matches, returning the row id
    /// alongside a copy of the value. `None` when no entry references the
    /// given event.
    pub async fn find_by_event_id(&self, event_id: &str) -> Option<(i64, RoomToRemove)> {
        self.cache
            .lock()
            .await
            .iter()
            .find(|(_, entry)| entry.event_id == event_id)
            .map(|(&id, entry)| (id, entry.clone()))
    }
}

fn split_users(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        Vec::new()
    } else {
        joined.split(',').map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry() -> RoomToRemove {
        RoomToRemove {
            event_id: "$notice:example.org".into(),
            room_id: "!old:example.org".into(),
            users: vec!["@alice:example.org".into(), "@bob:example.org".into()],
        }
    }

    async fn open_store(path: &std::path::Path) -> RemovalStore {
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        RemovalStore::open(db).await.unwrap()
    }

    #[tokio::test]
    async fn find_by_event_id_then_pop() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir.path().join("r.db")).await;

        store.append(entry()).await.unwrap();

        let (id, found) = store.find_by_event_id("$notice:example.org").await.unwrap();
        assert_eq!(found, entry());

        assert!(store.find_by_event_id("$other").await.is_none());

        let popped = store.pop(id).await.unwrap();
        assert_eq!(popped.users.len(), 2);
        assert!(store.find_by_event_id("$notice:example.org").await.is_none());
    }

    #[tokio::test]
    async fn user_list_round_trips_through_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.db");

        let store = open_store(&path).await;
        store.append(entry()).await.unwrap();
        store
            .append(RoomToRemove {
                event_id: "$empty".into(),
                room_id: "!empty:example.org".into(),
                users: Vec::new(),
            })
            .await
            .unwrap();
        drop(store);

        let store = open_store(&path).await;
        let (_, found) = store.find_by_event_id("$notice:example.org").await.unwrap();
        assert_eq!(found.users, entry().users);
        let (_, empty) = store.find_by_event_id("$empty").await.unwrap();
        assert!(empty.users.is_empty());
    }
}
