// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic key/value config store.
//!
//! Holds runtime-updatable settings such as the destination space id.
//! Read policy: `get` returns `Option`; an absent key is a soft case, never
//! an error. Write policy: `update` of an absent key is a hard error;
//! well-known keys are seeded at startup via `ensure`.

use std::collections::HashMap;

use roomport_core::RoomportError;
use rusqlite::params;
use tokio::sync::Mutex;

use crate::database::{Database, map_tr_err};

/// Config key for the destination space id.
pub const SPACE_ID_KEY: &str = "space_id";

/// Write-through cache over the `config` table.
pub struct ConfigStore {
    db: Database,
    cache: Mutex<HashMap<String, String>>,
}

impl ConfigStore {
    /// Load all rows into memory.
    pub async fn open(db: Database) -> Result<Self, RoomportError> {
        let rows = db
            .connection()
            .call(|conn| -> Result<Vec<(String, String)>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT key, value FROM config")?;
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

    /// The value for `key`, or `None` if it was never configured.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().await.get(key).cloned()
    }

    /// Update an existing key. Fails with NotFound for an absent key.
    pub async fn update(&self, key: &str, value: &str) -> Result<(), RoomportError> {
        let mut cache = self.cache.lock().await;
        let (k, v) = (key.to_string(), value.to_string());
        let changed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "UPDATE config SET value = ?2 WHERE key = ?1",
                    params![k, v],
                )
            })
            .await
            .map_err(map_tr_err)?;
        if changed == 0 {
            return Err(RoomportError::NotFound {
                what: "config key",
                key: key.to_string(),
            });
        }
        cache.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Insert `key` with `value` only if it is absent. Used at startup to
    /// seed well-known keys so later `update`s always find their row.
    pub async fn ensure(&self, key: &str, value: &str) -> Result<(), RoomportError> {
        let mut cache = self.cache.lock().await;
        if cache.contains_key(key) {
            return Ok(());
        }
        let (k, v) = (key.to_string(), value.to_string());
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO config (key, value) VALUES (?1, ?2)",
                    params![k, v],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        cache.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
