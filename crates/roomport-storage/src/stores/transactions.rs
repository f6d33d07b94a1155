// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store of handled appservice transaction ids.
//!
//! Existence of a transaction id is the dedup gate: a transaction already in
//! this store was fully dispatched and must be acknowledged without
//! reprocessing. Rows are write-once and never deleted in normal operation.

use std::collections::BTreeMap;

use roomport_core::RoomportError;
use rusqlite::params;
use tokio::sync::Mutex;

use crate::database::{Database, map_tr_err};

/// Write-through cache over the `transactions` table.
pub struct TransactionStore {
    db: Database,
    cache: Mutex<BTreeMap<i64, String>>,
}

impl TransactionStore {
    /// Load all rows into memory.
    pub async fn open(db: Database) -> Result<Self, RoomportError> {
        let rows = db
            .connection()
            .call(|conn| -> Result<Vec<(i64, String)>, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT id, txn_id FROM transactions")?;
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

    /// Record a transaction id as handled. The insert commits before the
    /// cache is updated.
    pub async fn append(&self, txn_id: &str) -> Result<i64, RoomportError> {
        let mut cache = self.cache.lock().await;
        let value = txn_id.to_string();
        let id = self
            .db
            .connection()
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO transactions (txn_id) VALUES (?1)",
                    params![value],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(map_tr_err)?;
        cache.insert(id, txn_id.to_string());
        Ok(id)
    }

    /// Whether the given transaction id was already handled.
    pub async fn contains(&self, txn_id: &str) -> bool {
        self.cache.lock().await.values().any(|t| t == txn_id)
    }
}
